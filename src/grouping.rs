//! Grouping of document chunks by a shared source identifier.

use std::collections::HashMap;

use crate::{document::Document, error::EmbedderError};

/// Documents grouped by the value of one metadata field.
///
/// Groups are kept in order of first appearance and hold indices into the input
/// slice in their original relative order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    groups: HashMap<String, Vec<usize>>,
    order: Vec<String>,
}

/// Groups `documents` by the metadata field `field`.
///
/// Every document must carry the field with a non-null value; the first one that
/// does not fails the whole operation.
pub fn group_by_field(documents: &[Document], field: &str) -> Result<Grouping, EmbedderError> {
    let mut grouping = Grouping::default();
    for (ix, document) in documents.iter().enumerate() {
        let key = document
            .meta_string(field)
            .ok_or_else(|| EmbedderError::MissingGroupingKey {
                field: field.to_string(),
            })?;
        match grouping.groups.get_mut(&key) {
            Some(members) => members.push(ix),
            None => {
                grouping.order.push(key.clone());
                grouping.groups.insert(key, vec![ix]);
            }
        }
    }

    Ok(grouping)
}

impl Grouping {
    /// Group keys in first-occurrence order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn group(&self, key: &str) -> Option<&[usize]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Groups as `(key, member indices)`, in first-occurrence order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> + '_ {
        self.order
            .iter()
            .map(move |key| (key.as_str(), self.groups[key].as_slice()))
    }

    /// Member indices of all groups laid end to end. This is the order in which
    /// results for grouped submissions come back.
    pub fn flattened(&self) -> Vec<usize> {
        self.iter()
            .flat_map(|(_, members)| members.iter().copied())
            .collect()
    }
}
