use serde::Deserialize;

/// Fields of the key validation response the client relies on.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct KeyValidation {
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_supporter: bool,
}
