//! Key layout for index roots and pages.

use uuid::Uuid;

/// Key of the root document for index `name`.
pub(crate) fn root_key(name: &str) -> String {
    format!("index:{name}")
}

/// Key of page `page_id` under `root_key`.
pub(crate) fn page_key(root_key: &str, page_id: &str) -> String {
    format!("{root_key}:node:{page_id}")
}

/// A fresh, random page id.
pub(crate) fn new_page_id() -> String {
    Uuid::new_v4().to_string()
}
