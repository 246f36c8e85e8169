use crate::floating_type_mod::FT;
use crate::V3;

/// A rigid body with a prescribed translation. Surfaces and field points may
/// be bound to one; the body itself carries no discretization.
#[derive(Debug)]
pub struct Body {
    name: String,
    pos0: V3,
    vel: V3,
}

impl Body {
    pub fn new(name: impl Into<String>) -> Self {
        Body {
            name: name.into(),
            pos0: V3::zeros(),
            vel: V3::zeros(),
        }
    }

    pub fn with_translation(name: impl Into<String>, vel: V3) -> Self {
        Body {
            name: name.into(),
            pos0: V3::zeros(),
            vel,
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_pos(&self, time: FT) -> V3 {
        self.pos0 + self.vel * time
    }

    pub fn get_vel(&self, _time: FT) -> V3 {
        self.vel
    }

    pub fn moves(&self) -> bool {
        self.vel.norm_squared() > FT::EPSILON
    }
}
