#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }

    /// Maps a client-supplied role label. Anything the upstream has no
    /// dedicated role for, `system` included, is sent as a user turn.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "assistant" | "model" | "ai" => Self::Model,
            _ => Self::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// One upstream call: the model to use and the full ordered transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub model: String,
    pub contents: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::{Role, Turn};

    #[test]
    fn from_label_maps_model_aliases() {
        assert_eq!(Role::from_label("assistant"), Role::Model);
        assert_eq!(Role::from_label("Model"), Role::Model);
        assert_eq!(Role::from_label(" AI "), Role::Model);
    }

    #[test]
    fn from_label_defaults_to_user() {
        assert_eq!(Role::from_label("user"), Role::User);
        assert_eq!(Role::from_label("system"), Role::User);
        assert_eq!(Role::from_label(""), Role::User);
        assert_eq!(Role::from_label("narrator"), Role::User);
    }

    #[test]
    fn constructors_tag_roles() {
        assert_eq!(Turn::user("hi").role.as_str(), "user");
        assert_eq!(Turn::model("hello").role.as_str(), "model");
    }
}
