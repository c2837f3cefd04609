/// A stored wiki page. `id` is assigned by the store; `title` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub raw_content: String,
}
