//! Feed inclusion rules.
//!
//! The filter only ever sees post creates that already passed classification, and it doesn't
//! touch storage, so a feed can swap in its own rule without changing anything else.

use crate::ops::CreateOp;

pub trait FeedFilter: Send + Sync {
    fn includes(&self, create: &CreateOp) -> bool;
}

impl<F> FeedFilter for F
where
    F: Fn(&CreateOp) -> bool + Send + Sync,
{
    fn includes(&self, create: &CreateOp) -> bool {
        self(create)
    }
}

/// Posts that mention a keyword, case-insensitively.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    /// stored lowercased
    keyword: String,
    pub match_alt_text: bool,
    pub include_replies: bool,
}

impl KeywordFilter {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            match_alt_text: false,
            include_replies: false,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    fn mentions(&self, s: &str) -> bool {
        s.to_lowercase().contains(&self.keyword)
    }
}

impl FeedFilter for KeywordFilter {
    fn includes(&self, create: &CreateOp) -> bool {
        let Some(post) = create.record.as_post() else {
            return false;
        };
        if post.is_reply() && !self.include_replies {
            return false;
        }
        self.mentions(&post.text)
            || (self.match_alt_text && post.image_alts().into_iter().any(|alt| self.mentions(alt)))
    }
}
