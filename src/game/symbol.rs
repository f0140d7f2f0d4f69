use super::error::GameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A player's mark. `o` always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    #[serde(rename = "o")]
    O,
    #[serde(rename = "x")]
    X,
}

impl Symbol {
    /// Opposite symbol
    pub fn opposite(&self) -> Symbol {
        match self {
            Symbol::O => Symbol::X,
            Symbol::X => Symbol::O,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::O => "o",
            Symbol::X => "x",
        }
    }

    /// The symbol that plays first
    pub fn first() -> Symbol {
        Symbol::O
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "o" => Ok(Symbol::O),
            "x" => Ok(Symbol::X),
            _ => Err(GameError::InvalidSymbol(format!(
                "Expected 'o' or 'x', got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// A single 3x3 grid
    #[default]
    Regular,
    /// A 3x3 grid of 3x3 grids
    Ultimate,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Regular => "regular",
            GameMode::Ultimate => "ultimate",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" | "r" => Ok(GameMode::Regular),
            "ultimate" | "u" => Ok(GameMode::Ultimate),
            _ => Err(GameError::InvalidMode(format!(
                "Expected 'regular' or 'ultimate', got '{}'",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_opposite() {
        assert_eq!(Symbol::O.opposite(), Symbol::X);
        assert_eq!(Symbol::X.opposite(), Symbol::O);
        assert_eq!(Symbol::first(), Symbol::O);
    }

    #[test]
    fn test_symbol_parse() {
        assert_eq!("o".parse::<Symbol>().unwrap(), Symbol::O);
        assert_eq!("X".parse::<Symbol>().unwrap(), Symbol::X);
        assert!(matches!(
            "z".parse::<Symbol>(),
            Err(GameError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn test_symbol_wire_format() {
        assert_eq!(serde_json::to_string(&Symbol::O).unwrap(), "\"o\"");
        assert_eq!(serde_json::from_str::<Symbol>("\"x\"").unwrap(), Symbol::X);
    }

    #[test]
    fn test_mode_parse_and_wire_format() {
        assert_eq!("Ultimate".parse::<GameMode>().unwrap(), GameMode::Ultimate);
        assert_eq!("r".parse::<GameMode>().unwrap(), GameMode::Regular);
        assert!("chess".parse::<GameMode>().is_err());
        assert_eq!(
            serde_json::to_string(&GameMode::Ultimate).unwrap(),
            "\"ultimate\""
        );
        assert_eq!(GameMode::default(), GameMode::Regular);
    }
}
