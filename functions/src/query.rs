use std::collections::HashMap;

/// Why a query parameter could not be read as a single string.
#[derive(Debug, PartialEq, Eq)]
pub enum ParamError {
    Missing,
    Repeated,
}

/// Decoded query string keeping every value of repeated keys, so handlers
/// can reject `?id=a&id=b` instead of silently picking one.
#[derive(Debug, Default)]
pub struct QueryParams {
    values: HashMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                values
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }
        QueryParams { values }
    }

    /// A parameter that may be absent but must not be repeated.
    pub fn optional(&self, name: &str) -> Result<Option<&str>, ParamError> {
        match self.values.get(name).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([value]) => Ok(Some(value.as_str())),
            Some(_) => Err(ParamError::Repeated),
        }
    }

    /// A parameter that must be present exactly once with a non-empty value.
    pub fn required(&self, name: &str) -> Result<&str, ParamError> {
        match self.optional(name)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ParamError::Missing),
        }
    }
}
