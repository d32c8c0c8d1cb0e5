use std::collections::BTreeSet;

use crate::dataset::DatasetDescriptor;
use crate::domain::Eov;
use crate::nvs::VocabularyEntry;

/// Variables of `dataset` that carry one of the EOV's vocabulary notations,
/// sorted and deduplicated.
///
/// P01 notations are tried first; P02 notations only when no P01 notation
/// matches. The first matched variable is recorded as the dataset's
/// variable for `eov` unless one was recorded before.
pub fn resolve_eov(dataset: &DatasetDescriptor, eov: Eov, entry: &VocabularyEntry) -> Vec<String> {
    let mut matched = match_notations(dataset, entry.primary_notations());
    if matched.is_empty() {
        matched = match_notations(dataset, entry.secondary_notations());
    }

    if let Some(first) = matched.first() {
        dataset.record_found_eov(eov, first);
    }

    matched
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn match_notations<'a>(
    dataset: &DatasetDescriptor,
    notations: impl Iterator<Item = &'a str>,
) -> Vec<String> {
    let index = dataset.parameter_index();
    notations
        .filter_map(|notation| index.get(notation).cloned())
        .collect()
}
