use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchBy {
    #[default]
    Id,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoint {
    pub value: String,
    pub match_by: MatchBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl EdgeEndpoint {
    pub fn id<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            match_by: MatchBy::Id,
            kind: None,
        }
    }

    pub fn name<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            match_by: MatchBy::Name,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start: EdgeEndpoint,
    pub end: EdgeEndpoint,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Edge {
    /// Edge between two nodes matched by id
    pub fn new<A, B>(start: A, end: B, kind: &str) -> Self
    where
        A: Into<String>,
        B: Into<String>,
    {
        Self::between(EdgeEndpoint::id(start), EdgeEndpoint::id(end), kind)
    }

    pub fn between(start: EdgeEndpoint, end: EdgeEndpoint, kind: &str) -> Self {
        Self {
            start,
            end,
            kind: kind.to_owned(),
            properties: Map::new(),
        }
    }
}
