//! Delivery tones: how far a message travels through the tree.

use std::fmt;
use std::str::FromStr;

use crate::error::ToneError;

/// Delivery mode of a message, deciding its audience from the tree shape.
///
/// | Tone | Audience |
/// |------|----------|
/// | `Yell` | every attached node of the tree, pre-order from the root |
/// | `Command` | the sender's direct children |
/// | `Say` | the sender's parent, then the parent's other children |
/// | `Whisper` | one explicitly named recipient |
/// | `Think` | the sender itself |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Broadcast to the whole tree.
    Yell,
    /// Address the sender's direct children.
    Command,
    /// Address the sender's parent and siblings.
    Say,
    /// Address exactly one recipient.
    Whisper,
    /// Address only the sender.
    Think,
}

impl Tone {
    /// All tones, in declaration order.
    pub const ALL: [Tone; 5] = [
        Tone::Yell,
        Tone::Command,
        Tone::Say,
        Tone::Whisper,
        Tone::Think,
    ];

    /// Lower-case name used in scripts and on the console.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yell => "yell",
            Self::Command => "command",
            Self::Say => "say",
            Self::Whisper => "whisper",
            Self::Think => "think",
        }
    }

    /// Whether this tone needs an explicit recipient id.
    pub fn requires_recipient(self) -> bool {
        matches!(self, Self::Whisper)
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = ToneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tone::ALL
            .into_iter()
            .find(|tone| tone.as_str() == s)
            .ok_or_else(|| ToneError::UnknownTone { name: s.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("yell".parse::<Tone>(), Ok(Tone::Yell));
        assert_eq!("whisper".parse::<Tone>(), Ok(Tone::Whisper));
        assert_eq!(Tone::Command.to_string(), "command");
    }

    #[test]
    fn rejects_unknown_name() {
        assert_eq!(
            "Yell".parse::<Tone>(),
            Err(ToneError::UnknownTone {
                name: "Yell".into()
            })
        );
        assert!("".parse::<Tone>().is_err());
    }

    #[test]
    fn only_whisper_requires_recipient() {
        let needing: Vec<_> = Tone::ALL
            .into_iter()
            .filter(|t| t.requires_recipient())
            .collect();
        assert_eq!(needing, vec![Tone::Whisper]);
    }
}
