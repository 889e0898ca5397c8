//! Locator: declarative element queries.
//!
//! A [`LocatorQuery`] is a plain value. Every resolution goes back to the
//! live document, so a query built before a navigation still works after
//! it. Zero matches is an ordinary answer (an empty `Vec`), never an
//! error. The Locator does not retry; waiting belongs to [`crate::wait`].

use crate::driver::NodeId;
use crate::result::SondaResult;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which of the matched elements to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pick {
    /// Every match in document order
    #[default]
    All,
    /// The first match
    First,
    /// The last match
    Last,
    /// The match at a zero-based index
    Nth(usize),
}

impl Pick {
    /// Narrow an ordered match list
    #[must_use]
    pub fn apply<T>(self, mut matches: Vec<T>) -> Vec<T> {
        match self {
            Self::All => matches,
            Self::First => {
                matches.truncate(1);
                matches
            }
            Self::Last => matches.pop().into_iter().collect(),
            Self::Nth(i) => {
                if i < matches.len() {
                    vec![matches.swap_remove(i)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Number of results kept from `total` matches
    #[must_use]
    pub fn cardinality(self, total: usize) -> usize {
        match self {
            Self::All => total,
            Self::First | Self::Last => total.min(1),
            Self::Nth(i) => usize::from(i < total),
        }
    }

    /// Offset of the first kept match within the full match list
    const fn offset(self, total: usize) -> usize {
        match self {
            Self::All | Self::First => 0,
            Self::Last => total.saturating_sub(1),
            Self::Nth(i) => i,
        }
    }
}

/// Selector, optional text filter and cardinality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorQuery {
    /// CSS selector
    pub selector: String,
    /// Keep only elements whose text contains this
    pub text: Option<String>,
    /// Which matches to keep
    pub pick: Pick,
}

impl LocatorQuery {
    /// Query for every element matching `selector`
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: None,
            pick: Pick::All,
        }
    }

    /// Filter by contained text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Keep the first match
    #[must_use]
    pub const fn first(mut self) -> Self {
        self.pick = Pick::First;
        self
    }

    /// Keep the last match
    #[must_use]
    pub const fn last(mut self) -> Self {
        self.pick = Pick::Last;
        self
    }

    /// Keep the match at `index`
    #[must_use]
    pub const fn nth(mut self, index: usize) -> Self {
        self.pick = Pick::Nth(index);
        self
    }

    /// Keep every match
    #[must_use]
    pub const fn all(mut self) -> Self {
        self.pick = Pick::All;
        self
    }
}

impl fmt::Display for LocatorQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector)?;
        if let Some(text) = &self.text {
            write!(f, " >> text={text:?}")?;
        }
        match self.pick {
            Pick::All => Ok(()),
            Pick::First => f.write_str(" >> first"),
            Pick::Last => f.write_str(" >> last"),
            Pick::Nth(i) => write!(f, " >> nth={i}"),
        }
    }
}

impl From<&str> for LocatorQuery {
    fn from(selector: &str) -> Self {
        Self::new(selector)
    }
}

/// A resolved element, valid only within the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    session: Arc<str>,
    node: NodeId,
    selector: String,
    index: usize,
}

impl ElementHandle {
    pub(crate) fn new(session: Arc<str>, node: NodeId, selector: &str, index: usize) -> Self {
        Self {
            session,
            node,
            selector: selector.to_string(),
            index,
        }
    }

    /// Id of the owning session
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session
    }

    /// Driver node id
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Selector this handle was resolved from
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Position among all matches of the selector
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

impl Session {
    /// Resolve a query to element handles in document order
    pub async fn resolve(&self, query: &LocatorQuery) -> SondaResult<Vec<ElementHandle>> {
        let driver = self.driver()?;
        let nodes = self
            .bounded(
                "resolve",
                driver.query(&query.selector, query.text.as_deref()),
            )
            .await?;
        let offset = query.pick.offset(nodes.len());
        let handles: Vec<ElementHandle> = query
            .pick
            .apply(nodes)
            .into_iter()
            .enumerate()
            .map(|(i, node)| {
                ElementHandle::new(self.shared_id(), node, &query.selector, offset + i)
            })
            .collect();
        debug!(query = %query, matched = handles.len(), "resolve");
        Ok(handles)
    }

    /// Number of elements the query resolves to, from a single DOM query
    pub async fn count(&self, query: &LocatorQuery) -> SondaResult<usize> {
        let driver = self.driver()?;
        let total = self
            .bounded(
                "count",
                driver.count(&query.selector, query.text.as_deref()),
            )
            .await?;
        Ok(query.pick.cardinality(total))
    }

    /// First element the query resolves to
    pub async fn first(&self, query: &LocatorQuery) -> SondaResult<Option<ElementHandle>> {
        Ok(self.resolve(query).await?.into_iter().next())
    }

    /// Whether the element is attached and rendered
    pub async fn is_visible(&self, handle: &ElementHandle) -> SondaResult<bool> {
        self.check_handle(handle)?;
        let driver = self.driver()?;
        let state = self
            .bounded("visibility", driver.node_state(handle.node()))
            .await?;
        Ok(state.attached && state.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod pick_tests {
        use super::*;

        #[test]
        fn test_pick_on_empty() {
            for pick in [Pick::All, Pick::First, Pick::Last, Pick::Nth(0)] {
                assert!(pick.apply(Vec::<u64>::new()).is_empty());
            }
        }

        #[test]
        fn test_pick_variants() {
            let nodes = vec![10, 20, 30];
            assert_eq!(Pick::All.apply(nodes.clone()), vec![10, 20, 30]);
            assert_eq!(Pick::First.apply(nodes.clone()), vec![10]);
            assert_eq!(Pick::Last.apply(nodes.clone()), vec![30]);
            assert_eq!(Pick::Nth(1).apply(nodes.clone()), vec![20]);
            assert!(Pick::Nth(3).apply(nodes).is_empty());
        }

        #[test]
        fn test_offsets() {
            assert_eq!(Pick::Last.offset(3), 2);
            assert_eq!(Pick::Nth(1).offset(3), 1);
            assert_eq!(Pick::First.offset(0), 0);
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_builder() {
            let query = LocatorQuery::new(".source-card").with_text("love").nth(2);
            assert_eq!(query.selector, ".source-card");
            assert_eq!(query.text.as_deref(), Some("love"));
            assert_eq!(query.pick, Pick::Nth(2));
        }

        #[test]
        fn test_display() {
            assert_eq!(LocatorQuery::new("aside button").to_string(), "aside button");
            assert_eq!(
                LocatorQuery::new("button").with_text("Go").first().to_string(),
                "button >> text=\"Go\" >> first"
            );
        }

        #[test]
        fn test_from_str() {
            let query: LocatorQuery = ".stats-card".into();
            assert_eq!(query.pick, Pick::All);
        }
    }

    mod handle_tests {
        use super::*;

        #[test]
        fn test_handle_display() {
            let handle = ElementHandle::new(Arc::from("s1"), 7, ".paragraph-text", 3);
            assert_eq!(handle.to_string(), ".paragraph-text[3]");
            assert_eq!(handle.session_id(), "s1");
            assert_eq!(handle.node(), 7);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn pick_strategy() -> impl Strategy<Value = Pick> {
            prop_oneof![
                Just(Pick::All),
                Just(Pick::First),
                Just(Pick::Last),
                (0usize..20).prop_map(Pick::Nth),
            ]
        }

        proptest! {
            #[test]
            fn prop_cardinality_matches_apply(pick in pick_strategy(), total in 0usize..20) {
                let nodes: Vec<usize> = (0..total).collect();
                prop_assert_eq!(pick.apply(nodes).len(), pick.cardinality(total));
            }

            #[test]
            fn prop_kept_nodes_start_at_offset(pick in pick_strategy(), total in 1usize..20) {
                let nodes: Vec<usize> = (0..total).collect();
                if let Some(first) = pick.apply(nodes).first() {
                    prop_assert_eq!(*first, pick.offset(total));
                }
            }
        }
    }
}
