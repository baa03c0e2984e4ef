use std::fmt::{self, Display};

/// Reserved index names: `primary` maps to the backend's native primary
/// key, `all` to the unscoped list-everything access path.
pub const PRIMARY_INDEX: &str = "primary";
pub const ALL_INDEX: &str = "all";

///
/// IndexKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    /// Native primary key; never gets generated accessors.
    Primary,
    /// Unscoped listing. Backed by a synthetic partition value on the
    /// key-value backend and by no filter on the relational backend.
    All,
    /// Foreign-key access path created by a belongs-to reference.
    BelongsTo,
    /// Any other secondary access path.
    Other,
}

///
/// Index
///
/// One access path over an entity: partition facets (equality-bound) and
/// sort facets (range/order-bound), in declaration order.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Index {
    name: String,
    kind: IndexKind,
    partition: Vec<String>,
    sort: Vec<String>,
}

impl Index {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: IndexKind,
        partition: Vec<String>,
        sort: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            partition,
            sort,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        self.kind
    }

    #[must_use]
    pub fn partition_facets(&self) -> &[String] {
        &self.partition
    }

    #[must_use]
    pub fn sort_facets(&self) -> &[String] {
        &self.sort
    }

    /// All key facets in declaration order (partition, then sort). This
    /// order is the argument order of generated accessors.
    #[must_use]
    pub fn facets(&self) -> Vec<&str> {
        self.partition
            .iter()
            .chain(self.sort.iter())
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub const fn is_primary(&self) -> bool {
        matches!(self.kind, IndexKind::Primary)
    }

    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self.kind, IndexKind::All)
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.facets().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_follow_declaration_order() {
        let index = Index::new(
            "bySiteIdAndStatus",
            IndexKind::Other,
            vec!["siteId".into()],
            vec!["status".into(), "updatedAt".into()],
        );
        assert_eq!(index.facets(), vec!["siteId", "status", "updatedAt"]);
        assert_eq!(index.to_string(), "bySiteIdAndStatus(siteId, status, updatedAt)");
    }
}
