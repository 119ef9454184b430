//! The closed gesture vocabulary.
//!
//! Class indices follow the order the classifier was trained with: the 26
//! letters first, then the seven phrase tokens.

use std::fmt;

use serde::{Serialize, Serializer};

pub const LABEL_COUNT: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Hello,
    Done,
    ThankYou,
    ILoveYou,
    Sorry,
    Please,
    YouAreWelcome,
}

pub const LABELS: [Label; LABEL_COUNT] = [
    Label::A,
    Label::B,
    Label::C,
    Label::D,
    Label::E,
    Label::F,
    Label::G,
    Label::H,
    Label::I,
    Label::J,
    Label::K,
    Label::L,
    Label::M,
    Label::N,
    Label::O,
    Label::P,
    Label::Q,
    Label::R,
    Label::S,
    Label::T,
    Label::U,
    Label::V,
    Label::W,
    Label::X,
    Label::Y,
    Label::Z,
    Label::Hello,
    Label::Done,
    Label::ThankYou,
    Label::ILoveYou,
    Label::Sorry,
    Label::Please,
    Label::YouAreWelcome,
];

impl Label {
    pub fn from_index(idx: usize) -> Option<Self> {
        LABELS.get(idx).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The display string, identical to the label the classifier was trained on.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::A => "A",
            Label::B => "B",
            Label::C => "C",
            Label::D => "D",
            Label::E => "E",
            Label::F => "F",
            Label::G => "G",
            Label::H => "H",
            Label::I => "I",
            Label::J => "J",
            Label::K => "K",
            Label::L => "L",
            Label::M => "M",
            Label::N => "N",
            Label::O => "O",
            Label::P => "P",
            Label::Q => "Q",
            Label::R => "R",
            Label::S => "S",
            Label::T => "T",
            Label::U => "U",
            Label::V => "V",
            Label::W => "W",
            Label::X => "X",
            Label::Y => "Y",
            Label::Z => "Z",
            Label::Hello => "Hello",
            Label::Done => "Done",
            Label::ThankYou => "Thank You",
            Label::ILoveYou => "I Love you",
            Label::Sorry => "Sorry",
            Label::Please => "Please",
            Label::YouAreWelcome => "You are welcome.",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_training_order() {
        assert_eq!(Label::from_index(0), Some(Label::A));
        assert_eq!(Label::from_index(25), Some(Label::Z));
        assert_eq!(Label::from_index(26), Some(Label::Hello));
        assert_eq!(Label::from_index(28), Some(Label::ThankYou));
        assert_eq!(Label::from_index(32), Some(Label::YouAreWelcome));
        assert_eq!(Label::from_index(33), None);
    }

    #[test]
    fn index_round_trips_for_every_label() {
        for (i, label) in LABELS.iter().enumerate() {
            assert_eq!(label.index(), i);
        }
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&Label::ILoveYou).unwrap();
        assert_eq!(json, "\"I Love you\"");
        assert_eq!(Label::YouAreWelcome.to_string(), "You are welcome.");
    }
}
