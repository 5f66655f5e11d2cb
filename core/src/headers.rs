//! Default header set owned by the gateway.
//!
//! # Design
//! Headers are kept as an ordered list so the request a caller inspects
//! through `Gateway::build_*` matches what goes on the wire. Names compare
//! case-insensitively; inserting an existing name replaces its value in
//! place. Per-call overrides replace the whole set, they are never merged.

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";
pub const AUTHORIZATION: &str = "Authorization";

pub const APPLICATION_JSON: &str = "application/json";
/// Content type used for JSON bodies when the effective set names none.
pub const JSON_BODY_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gateway's defaults: content type, accept type and an optional
    /// bearer token.
    pub fn defaults(content_type: &str, accept: &str, token: Option<&str>) -> Self {
        let mut headers = Self::new()
            .with(CONTENT_TYPE, content_type)
            .with(ACCEPT, accept);
        if let Some(token) = token {
            headers.insert(AUTHORIZATION, format!("Bearer {token}"));
        }
        headers
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        crate::http::find_header(&self.entries, name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.entries
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderSet::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
