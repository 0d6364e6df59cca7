use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// 1-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }.clamped()
    }

    pub fn clamped(self) -> Self {
        let per_page = match self.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        };
        Self {
            page: self.page.max(1),
            per_page,
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.clamped().per_page)
    }

    pub fn offset(&self) -> i64 {
        let p = self.clamped();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let request = request.clamped();
        let per_page = u64::from(request.per_page);
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: total.div_ceil(per_page),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let p = PageRequest::new(0, 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, DEFAULT_PER_PAGE);

        let p = PageRequest::new(3, 500);
        assert_eq!(p.per_page, MAX_PER_PAGE);
        assert_eq!(p.offset(), 200);
        assert_eq!(p.limit(), 100);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<u8> = Page::new(vec![], PageRequest::new(1, 20), 41);
        assert_eq!(page.total_pages, 3);

        let empty: Page<u8> = Page::new(vec![], PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
    }
}
