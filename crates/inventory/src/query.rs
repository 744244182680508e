//! Catalog listing: filtering and pagination.

use serde::{Deserialize, Serialize};

use crate::Component;

/// Page size limits applied to every listing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    pub default_per_page: usize,
    pub max_per_page: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

/// Filter for catalog listings. All criteria are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentQuery {
    /// Exact category match (case-insensitive).
    #[serde(default)]
    pub category: Option<String>,
    /// Substring match over name, part number and manufacturer (case-insensitive).
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub low_stock_only: bool,
    #[serde(default)]
    pub include_inactive: bool,
    /// 1-based page number; `0` is treated as `1`.
    #[serde(default)]
    pub page: usize,
    /// `None` uses [`PageLimits::default_per_page`].
    #[serde(default)]
    pub per_page: Option<usize>,
}

impl ComponentQuery {
    pub fn low_stock() -> Self {
        Self {
            low_stock_only: true,
            ..Self::default()
        }
    }

    pub fn in_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, component: &Component) -> bool {
        if !self.include_inactive && !component.is_active() {
            return false;
        }
        if self.low_stock_only && !component.is_low_stock() {
            return false;
        }
        if let Some(category) = &self.category {
            if !component.category().eq_ignore_ascii_case(category.trim()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() {
                let haystacks = [
                    Some(component.name()),
                    Some(component.part_number()),
                    component.manufacturer(),
                ];
                if !haystacks
                    .into_iter()
                    .flatten()
                    .any(|h| h.to_lowercase().contains(&needle))
                {
                    return false;
                }
            }
        }
        true
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.per_page == 0 {
            0
        } else {
            self.total.div_ceil(self.per_page)
        }
    }

    /// Slice an already filtered and ordered list.
    pub fn paginate(all: Vec<T>, query: &ComponentQuery, limits: PageLimits) -> Self {
        let per_page = query
            .per_page
            .unwrap_or(limits.default_per_page)
            .clamp(1, limits.max_per_page.max(1));
        let page = query.page.max(1);
        let total = all.len();

        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Self {
            items,
            page,
            per_page,
            total,
        }
    }
}
