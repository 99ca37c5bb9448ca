//! Map Catalogue
//!
//! The closed set of playable maps and their lobby sizes. Terrain data lives
//! with the client; the server only needs identifiers and player counts.

use std::fmt;

use serde::{Serialize, Deserialize};

/// Lobby sizes per map: `[large, medium, small]`.
pub type PlayerCounts = [u32; 3];

macro_rules! maps {
    ($($variant:ident => $name:literal, $counts:expr;)*) => {
        /// Playable map.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum GameMapType {
            $(
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl GameMapType {
            /// Every map, in declaration order.
            pub const ALL: &'static [GameMapType] = &[$(GameMapType::$variant,)*];

            /// Stable identifier (also the wire name).
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(GameMapType::$variant => $name,)*
                }
            }

            /// Lobby sizes for this map.
            pub const fn player_counts(self) -> PlayerCounts {
                match self {
                    $(GameMapType::$variant => $counts,)*
                }
            }
        }
    };
}

maps! {
    Africa => "Africa", [100, 70, 50];
    Asia => "Asia", [50, 40, 30];
    Australia => "Australia", [70, 40, 30];
    Achiran => "Achiran", [40, 36, 30];
    Baikal => "Baikal", [100, 70, 50];
    BaikalNukeWars => "Baikal (Nuke Wars)", [100, 70, 50];
    BetweenTwoSeas => "Between Two Seas", [70, 50, 40];
    BlackSea => "Black Sea", [50, 30, 30];
    Britannia => "Britannia", [50, 30, 20];
    DeglaciatedAntarctica => "Deglaciated Antarctica", [50, 40, 30];
    EastAsia => "East Asia", [50, 30, 20];
    Europe => "Europe", [100, 70, 50];
    EuropeClassic => "Europe Classic", [50, 30, 30];
    FalklandIslands => "Falkland Islands", [50, 30, 20];
    FaroeIslands => "Faroe Islands", [20, 15, 10];
    GatewayToTheAtlantic => "Gateway to the Atlantic", [100, 70, 50];
    GiantWorldMap => "Giant World Map", [100, 70, 50];
    Halkidiki => "Halkidiki", [100, 50, 40];
    Iceland => "Iceland", [50, 40, 30];
    Italia => "Italia", [50, 30, 20];
    Japan => "Japan", [20, 15, 10];
    Mars => "Mars", [70, 40, 30];
    Mena => "Mena", [70, 50, 40];
    Montreal => "Montreal", [60, 40, 30];
    NorthAmerica => "North America", [70, 40, 30];
    Oceania => "Oceania", [10, 10, 10];
    Pangaea => "Pangaea", [20, 15, 10];
    Pluto => "Pluto", [100, 70, 50];
    SouthAmerica => "South America", [70, 50, 40];
    StraitOfGibraltar => "Strait of Gibraltar", [100, 70, 50];
    World => "World", [50, 30, 20];
    Yenisei => "Yenisei", [150, 100, 70];
}

impl GameMapType {
    /// Largest lobby this map supports.
    pub const fn max_players(self) -> u32 {
        self.player_counts()[0]
    }
}

impl fmt::Display for GameMapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_players() {
        assert_eq!(GameMapType::Oceania.max_players(), 10);
        assert_eq!(GameMapType::Asia.max_players(), 50);
        assert_eq!(GameMapType::Africa.max_players(), 100);
        assert_eq!(GameMapType::Yenisei.max_players(), 150);
    }

    #[test]
    fn test_counts_are_descending() {
        for map in GameMapType::ALL {
            let [large, medium, small] = map.player_counts();
            assert!(large >= medium && medium >= small, "{map}");
        }
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&GameMapType::GatewayToTheAtlantic).unwrap();
        assert_eq!(json, "\"Gateway to the Atlantic\"");
        let back: GameMapType = serde_json::from_str("\"North America\"").unwrap();
        assert_eq!(back, GameMapType::NorthAmerica);
    }

    #[test]
    fn test_catalogue_size() {
        assert_eq!(GameMapType::ALL.len(), 32);
    }
}
