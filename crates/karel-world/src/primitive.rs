//! The 22 robot primitives: 4 actions and 18 boolean sensors.

use std::fmt;

/// An operation that changes the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Move,
    TurnLeft,
    PickBeeper,
    PutBeeper,
}

/// A boolean query over the world. Sensors never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    FrontIsClear,
    FrontIsBlocked,
    LeftIsClear,
    LeftIsBlocked,
    RightIsClear,
    RightIsBlocked,
    BeepersPresent,
    NoBeepersPresent,
    BeepersInBag,
    NoBeepersInBag,
    FacingNorth,
    NotFacingNorth,
    FacingEast,
    NotFacingEast,
    FacingSouth,
    NotFacingSouth,
    FacingWest,
    NotFacingWest,
}

impl Sensor {
    /// The sensor that always answers the opposite.
    pub fn complement(self) -> Sensor {
        match self {
            Sensor::FrontIsClear => Sensor::FrontIsBlocked,
            Sensor::FrontIsBlocked => Sensor::FrontIsClear,
            Sensor::LeftIsClear => Sensor::LeftIsBlocked,
            Sensor::LeftIsBlocked => Sensor::LeftIsClear,
            Sensor::RightIsClear => Sensor::RightIsBlocked,
            Sensor::RightIsBlocked => Sensor::RightIsClear,
            Sensor::BeepersPresent => Sensor::NoBeepersPresent,
            Sensor::NoBeepersPresent => Sensor::BeepersPresent,
            Sensor::BeepersInBag => Sensor::NoBeepersInBag,
            Sensor::NoBeepersInBag => Sensor::BeepersInBag,
            Sensor::FacingNorth => Sensor::NotFacingNorth,
            Sensor::NotFacingNorth => Sensor::FacingNorth,
            Sensor::FacingEast => Sensor::NotFacingEast,
            Sensor::NotFacingEast => Sensor::FacingEast,
            Sensor::FacingSouth => Sensor::NotFacingSouth,
            Sensor::NotFacingSouth => Sensor::FacingSouth,
            Sensor::FacingWest => Sensor::NotFacingWest,
            Sensor::NotFacingWest => Sensor::FacingWest,
        }
    }
}

/// Any robot primitive callable from a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Action(Action),
    Sensor(Sensor),
}

impl Primitive {
    /// Every primitive, actions first.
    pub const ALL: [Primitive; 22] = [
        Primitive::Action(Action::Move),
        Primitive::Action(Action::TurnLeft),
        Primitive::Action(Action::PickBeeper),
        Primitive::Action(Action::PutBeeper),
        Primitive::Sensor(Sensor::FrontIsClear),
        Primitive::Sensor(Sensor::FrontIsBlocked),
        Primitive::Sensor(Sensor::LeftIsClear),
        Primitive::Sensor(Sensor::LeftIsBlocked),
        Primitive::Sensor(Sensor::RightIsClear),
        Primitive::Sensor(Sensor::RightIsBlocked),
        Primitive::Sensor(Sensor::BeepersPresent),
        Primitive::Sensor(Sensor::NoBeepersPresent),
        Primitive::Sensor(Sensor::BeepersInBag),
        Primitive::Sensor(Sensor::NoBeepersInBag),
        Primitive::Sensor(Sensor::FacingNorth),
        Primitive::Sensor(Sensor::NotFacingNorth),
        Primitive::Sensor(Sensor::FacingEast),
        Primitive::Sensor(Sensor::NotFacingEast),
        Primitive::Sensor(Sensor::FacingSouth),
        Primitive::Sensor(Sensor::NotFacingSouth),
        Primitive::Sensor(Sensor::FacingWest),
        Primitive::Sensor(Sensor::NotFacingWest),
    ];

    /// The name a program calls this primitive by.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Action(a) => match a {
                Action::Move => "move",
                Action::TurnLeft => "turn_left",
                Action::PickBeeper => "pick_beeper",
                Action::PutBeeper => "put_beeper",
            },
            Primitive::Sensor(s) => match s {
                Sensor::FrontIsClear => "front_is_clear",
                Sensor::FrontIsBlocked => "front_is_blocked",
                Sensor::LeftIsClear => "left_is_clear",
                Sensor::LeftIsBlocked => "left_is_blocked",
                Sensor::RightIsClear => "right_is_clear",
                Sensor::RightIsBlocked => "right_is_blocked",
                Sensor::BeepersPresent => "beepers_present",
                Sensor::NoBeepersPresent => "no_beepers_present",
                Sensor::BeepersInBag => "beepers_in_bag",
                Sensor::NoBeepersInBag => "no_beepers_in_bag",
                Sensor::FacingNorth => "facing_north",
                Sensor::NotFacingNorth => "not_facing_north",
                Sensor::FacingEast => "facing_east",
                Sensor::NotFacingEast => "not_facing_east",
                Sensor::FacingSouth => "facing_south",
                Sensor::NotFacingSouth => "not_facing_south",
                Sensor::FacingWest => "facing_west",
                Sensor::NotFacingWest => "not_facing_west",
            },
        }
    }

    /// Look a primitive up by its program-facing name.
    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_action(self) -> bool {
        matches!(self, Primitive::Action(_))
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
