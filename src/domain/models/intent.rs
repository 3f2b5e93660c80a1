use serde::{Deserialize, Serialize};

/// Closed vocabulary of intent tags attached to chunks and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    ReadResource,
    CreateResource,
    UpdateResource,
    DeleteResource,
    ListResource,
    Other,
}

impl IntentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentTag::ReadResource => "read_resource",
            IntentTag::CreateResource => "create_resource",
            IntentTag::UpdateResource => "update_resource",
            IntentTag::DeleteResource => "delete_resource",
            IntentTag::ListResource => "list_resource",
            IntentTag::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "read_resource" => IntentTag::ReadResource,
            "create_resource" => IntentTag::CreateResource,
            "update_resource" => IntentTag::UpdateResource,
            "delete_resource" => IntentTag::DeleteResource,
            "list_resource" => IntentTag::ListResource,
            _ => IntentTag::Other,
        }
    }

    /// Maps an HTTP verb to its CRUD intent.
    pub fn from_http_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(IntentTag::ReadResource),
            "POST" => Some(IntentTag::CreateResource),
            "PUT" | "PATCH" => Some(IntentTag::UpdateResource),
            "DELETE" => Some(IntentTag::DeleteResource),
            _ => None,
        }
    }

    /// Maps a leading identifier verb (already lowercased) to an intent.
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "get" | "read" | "fetch" | "find" | "load" | "show" => Some(IntentTag::ReadResource),
            "create" | "add" | "new" | "insert" | "register" | "recompute" | "make" => {
                Some(IntentTag::CreateResource)
            }
            "update" | "set" | "edit" | "modify" | "patch" | "change" => {
                Some(IntentTag::UpdateResource)
            }
            "delete" | "remove" | "destroy" | "drop" | "clear" => Some(IntentTag::DeleteResource),
            "list" | "all" | "enumerate" => Some(IntentTag::ListResource),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_method_table() {
        assert_eq!(
            IntentTag::from_http_method("GET"),
            Some(IntentTag::ReadResource)
        );
        assert_eq!(
            IntentTag::from_http_method("post"),
            Some(IntentTag::CreateResource)
        );
        assert_eq!(
            IntentTag::from_http_method("PUT"),
            Some(IntentTag::UpdateResource)
        );
        assert_eq!(
            IntentTag::from_http_method("PATCH"),
            Some(IntentTag::UpdateResource)
        );
        assert_eq!(
            IntentTag::from_http_method("DELETE"),
            Some(IntentTag::DeleteResource)
        );
        assert_eq!(IntentTag::from_http_method("OPTIONS"), None);
    }

    #[test]
    fn verb_mapping() {
        assert_eq!(IntentTag::from_verb("create"), Some(IntentTag::CreateResource));
        assert_eq!(IntentTag::from_verb("recompute"), Some(IntentTag::CreateResource));
        assert_eq!(IntentTag::from_verb("list"), Some(IntentTag::ListResource));
        assert_eq!(IntentTag::from_verb("frobnicate"), None);
    }

    #[test]
    fn parse_round_trip() {
        for tag in [
            IntentTag::ReadResource,
            IntentTag::CreateResource,
            IntentTag::UpdateResource,
            IntentTag::DeleteResource,
            IntentTag::ListResource,
            IntentTag::Other,
        ] {
            assert_eq!(IntentTag::parse(tag.as_str()), tag);
        }
    }
}
