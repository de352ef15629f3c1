//! Storefront and CMS rows (products, blog posts, courses).
//!
//! These tables are plain CRUD glue: rows pass through untouched apart from the `id` field, which
//! the table store owns.

use crate::config::TablesConfig;
use crate::types::TableId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Products,
    Posts,
    Courses,
}

impl ContentKind {
    pub fn table(&self, tables: &TablesConfig) -> Option<TableId> {
        match self {
            ContentKind::Products => tables.products,
            ContentKind::Posts => tables.posts,
            ContentKind::Courses => tables.courses,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Products => "products",
            ContentKind::Posts => "posts",
            ContentKind::Courses => "courses",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(ContentKind::Products),
            "posts" => Ok(ContentKind::Posts),
            "courses" => Ok(ContentKind::Courses),
            other => Err(format!("unknown content kind '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tables() {
        let tables = TablesConfig {
            products: Some(11),
            posts: None,
            ..TablesConfig::default()
        };
        assert_eq!(ContentKind::Products.table(&tables), Some(11));
        assert_eq!(ContentKind::Posts.table(&tables), None);
        assert_eq!("courses".parse::<ContentKind>().unwrap(), ContentKind::Courses);
        assert!("pages".parse::<ContentKind>().is_err());
    }
}
