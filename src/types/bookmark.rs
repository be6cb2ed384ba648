use serde::{Deserialize, Serialize};

/// A saved link as seen in the external bookmark tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub url: String,
    pub title: String,
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// A folder in the external bookmark tree. Root containers have no parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub id: String,
    pub title: String,
    pub parent_id: Option<String>,
}

impl FolderNode {
    pub fn is_root_container(&self) -> bool {
        self.parent_id.is_none()
    }
}
