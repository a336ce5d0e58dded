// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The package index handed from sources to the renderer. */

use {crate::control::ControlParagraph, std::collections::BTreeMap};

/// Packages indexed by component and architecture.
///
/// Components and architectures iterate in ascending lexicographic order;
/// the paragraphs within a `(component, architecture)` pair preserve the
/// order their source produced them in, duplicates included.
#[derive(Clone, Debug, Default)]
pub struct PackageList {
    components: BTreeMap<String, BTreeMap<String, Vec<ControlParagraph<'static>>>>,
}

impl PackageList {
    /// Append a package paragraph under a component and architecture.
    pub fn add(
        &mut self,
        component: impl ToString,
        architecture: impl ToString,
        paragraph: ControlParagraph<'static>,
    ) {
        self.components
            .entry(component.to_string())
            .or_default()
            .entry(architecture.to_string())
            .or_default()
            .push(paragraph);
    }

    /// Whether no packages have been added.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Total number of package paragraphs.
    pub fn package_count(&self) -> usize {
        self.iter_groups().map(|(_, _, packages)| packages.len()).sum()
    }

    /// Iterate `(component, architecture, packages)` groups in sorted order.
    pub fn iter_groups(
        &self,
    ) -> impl Iterator<Item = (&str, &str, &[ControlParagraph<'static>])> {
        self.components.iter().flat_map(|(component, architectures)| {
            architectures.iter().map(move |(architecture, packages)| {
                (component.as_str(), architecture.as_str(), packages.as_slice())
            })
        })
    }

    /// Component names, ascending.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    /// Union of architectures across components, ascending.
    pub fn architecture_names(&self) -> Vec<&str> {
        let mut names = self
            .components
            .values()
            .flat_map(|architectures| architectures.keys().map(String::as_str))
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        names
    }
}
