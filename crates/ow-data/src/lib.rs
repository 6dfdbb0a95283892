use ow_capture::{regions, Region};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Heroes the tracker knows how to recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeroId {
    Other,
    Baptiste,
    Brigitte,
    Juno,
    Kiriko,
    Lucio,
    Mercy,
    Zenyatta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Tank,
    Damage,
    Support,
    Other,
}

/// A weapon icon that identifies a hero.
/// `region` overrides the template's own region when the icon is drawn elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct Weapon {
    pub template: &'static str,
    pub region: Option<Region>,
}

/// Static description of a hero
#[derive(Debug, Clone, Copy)]
pub struct HeroData {
    pub id: HeroId,
    pub name: &'static str,
    pub role: Role,
    pub weapons: &'static [Weapon],
}

const fn weapon(template: &'static str) -> Weapon {
    Weapon {
        template,
        region: None,
    }
}

/// Every hero, `Other` first
pub const ROSTER: &[HeroData] = &[
    HeroData {
        id: HeroId::Other,
        name: "Other",
        role: Role::Other,
        weapons: &[],
    },
    HeroData {
        id: HeroId::Baptiste,
        name: "Baptiste",
        role: Role::Support,
        weapons: &[weapon("baptiste_weapon")],
    },
    HeroData {
        id: HeroId::Brigitte,
        name: "Brigitte",
        role: Role::Support,
        weapons: &[weapon("brigitte_weapon")],
    },
    HeroData {
        id: HeroId::Juno,
        name: "Juno",
        role: Role::Support,
        weapons: &[weapon("juno_weapon")],
    },
    HeroData {
        id: HeroId::Kiriko,
        name: "Kiriko",
        role: Role::Support,
        weapons: &[weapon("kiriko_weapon")],
    },
    HeroData {
        id: HeroId::Lucio,
        name: "Lucio",
        role: Role::Support,
        weapons: &[weapon("lucio_weapon")],
    },
    HeroData {
        id: HeroId::Mercy,
        name: "Mercy",
        role: Role::Support,
        weapons: &[
            weapon("mercy_staff"),
            weapon("mercy_pistol"),
            Weapon {
                template: "mercy_pistol",
                region: Some(regions::MERCY_PISTOL_ULT),
            },
        ],
    },
    HeroData {
        id: HeroId::Zenyatta,
        name: "Zenyatta",
        role: Role::Support,
        weapons: &[weapon("zenyatta_weapon")],
    },
];

impl HeroId {
    pub fn data(self) -> &'static HeroData {
        ROSTER
            .iter()
            .find(|h| h.id == self)
            .unwrap_or(&ROSTER[0])
    }

    pub fn name(self) -> &'static str {
        self.data().name
    }

    pub fn role(self) -> Role {
        self.data().role
    }

    pub fn weapons(self) -> &'static [Weapon] {
        self.data().weapons
    }

    /// Prefix shared by every trigger owned by this hero, e.g. `"mercy "`
    pub fn trigger_prefix(self) -> String {
        format!("{} ", self.name().to_lowercase())
    }

    pub fn all() -> impl Iterator<Item = HeroId> {
        ROSTER.iter().map(|h| h.id)
    }
}

impl fmt::Display for HeroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown hero: {0}")]
pub struct UnknownHero(pub String);

impl FromStr for HeroId {
    type Err = UnknownHero;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ROSTER
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(wanted))
            .map(|h| h.id)
            .ok_or_else(|| UnknownHero(s.to_string()))
    }
}

/// Order in which to re-scan the roster when `current` stops confirming.
///
/// Heroes sharing `current`'s role come first, since swaps inside a role are
/// the most common. `current` itself and `Other` are excluded.
pub fn scan_order(current: HeroId) -> Vec<HeroId> {
    let role = current.role();
    let candidates = HeroId::all().filter(|&h| h != current && h != HeroId::Other);
    let (mut same, other): (Vec<_>, Vec<_>) = candidates.partition(|h| h.role() == role);
    same.extend(other);
    same
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hero_names() {
        assert_eq!("mercy".parse::<HeroId>().unwrap(), HeroId::Mercy);
        assert_eq!(" Zenyatta ".parse::<HeroId>().unwrap(), HeroId::Zenyatta);
        assert!("Tracer".parse::<HeroId>().is_err());
    }

    #[test]
    fn test_every_weapon_has_a_region() {
        for hero in ROSTER {
            for w in hero.weapons {
                assert!(
                    regions::lookup(w.template).is_some(),
                    "{} weapon {} has no region",
                    hero.name,
                    w.template
                );
            }
        }
    }

    #[test]
    fn test_trigger_prefix() {
        assert_eq!(HeroId::Mercy.trigger_prefix(), "mercy ");
        assert_eq!(HeroId::Other.trigger_prefix(), "other ");
    }

    #[test]
    fn test_scan_order_excludes_current_and_other() {
        let order = scan_order(HeroId::Mercy);
        assert!(!order.contains(&HeroId::Mercy));
        assert!(!order.contains(&HeroId::Other));
        assert_eq!(order.len(), ROSTER.len() - 2);
        assert!(order.iter().all(|h| h.role() == Role::Support));
    }

    #[test]
    fn test_scan_order_from_other_covers_roster() {
        let order = scan_order(HeroId::Other);
        assert_eq!(order.len(), ROSTER.len() - 1);
    }

    #[test]
    fn test_hero_id_serializes_by_name() {
        let json = serde_json::to_string(&HeroId::Lucio).unwrap();
        assert_eq!(json, "\"Lucio\"");
    }
}
