//! Package construction, validation and release resolution
//!
//! A package is built once from a [`PackageDef`]: versions are derived in
//! declaration order, each seeded from its predecessor and reshaped by its
//! ordered modifications, then the whole history is validated. After
//! [`Package::build`] returns the package is immutable; a failed build
//! never yields a usable package.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PackError, Result};
use crate::schema::{
    Dependency, Item, ItemId, ItemKind, Mapping, Provenance, Template, Validation, Variable,
    VersionId,
};
use crate::version::{Modification, Version};

/// Declarative definition of a package, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDef {
    pub name: String,
    /// Output path associated with the package
    #[serde(default)]
    pub path: String,
    pub versions: Vec<VersionDef>,
}

/// Declarative definition of one version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDef {
    pub name: String,
    /// Name of the version this one derives from; must be declared earlier
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub modifications: Vec<Modification>,
}

/// An item exposed publicly by a release version
#[derive(Debug, Clone)]
pub struct ReleaseItem {
    /// Public name the item is exposed under
    pub name: String,
    /// The concrete item implementing it
    pub item: ItemId,
    /// Dotted type string of the implementing item
    pub type_name: String,
}

/// A resolved release version
#[derive(Debug, Clone)]
pub struct Release {
    pub version: VersionId,
    pub version_name: String,
    pub items: Vec<ReleaseItem>,
}

/// A validated, immutable version history
#[derive(Debug)]
pub struct Package {
    name: String,
    path: String,
    versions: Vec<Version>,
    items: Vec<Item>,
}

impl Package {
    /// Build and validate a package from its definition.
    ///
    /// Modifications are applied strictly in order within each version;
    /// whole-history invariants are checked once everything is constructed.
    pub fn build(def: PackageDef) -> Result<Package> {
        let mut seen = HashSet::new();
        for version in &def.versions {
            if !seen.insert(version.name.as_str()) {
                return Err(PackError::DuplicateVersion(version.name.clone()));
            }
        }

        let mut package = Package {
            name: def.name,
            path: def.path,
            versions: Vec::new(),
            items: Vec::new(),
        };
        for vdef in &def.versions {
            let previous = match &vdef.previous {
                Some(name) => Some(
                    package
                        .find_version(name)
                        .ok_or_else(|| PackError::VersionNotFound(name.clone()))?,
                ),
                None => None,
            };
            let vid = package.seed_version(vdef.name.clone(), previous);
            for modification in &vdef.modifications {
                package.apply(vid, modification)?;
            }
            package.versions[vid.index()].modifications = vdef.modifications.clone();
        }

        package.validate()?;
        debug!(
            name = %package.name,
            versions = package.versions.len(),
            items = package.items.len(),
            "package built and validated"
        );
        Ok(package)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn versions(&self) -> impl Iterator<Item = (VersionId, &Version)> {
        self.versions
            .iter()
            .enumerate()
            .map(|(idx, version)| (VersionId(idx as u32), version))
    }

    pub fn version(&self, id: VersionId) -> &Version {
        &self.versions[id.index()]
    }

    pub fn item(&self, id: ItemId) -> &Item {
        &self.items[id.index()]
    }

    /// Ordered item handles of one version, carry-overs included
    pub fn items_of(&self, version: VersionId) -> &[ItemId] {
        &self.versions[version.index()].items
    }

    pub fn find_version(&self, name: &str) -> Option<VersionId> {
        self.versions
            .iter()
            .position(|v| v.name == name)
            .map(|idx| VersionId(idx as u32))
    }

    pub fn find_item(&self, version: VersionId, name: &str) -> Option<ItemId> {
        self.versions[version.index()]
            .items
            .iter()
            .copied()
            .find(|id| self.items[id.index()].name == name)
    }

    /// Dotted type string `"Package.Version.Item"` of an item
    pub fn type_name(&self, item: ItemId) -> String {
        let item = &self.items[item.index()];
        let version = &self.versions[item.version.index()];
        format!("{}.{}.{}", self.name, version.name, item.name)
    }

    /// Resolve a release version: a name, or `None`/`"latest"` for the
    /// unique version no other version derives from.
    ///
    /// For every live item of the release version the exposed type is its
    /// nearest concrete ancestor.
    pub fn resolve_release(&self, version: Option<&str>) -> Result<Release> {
        let vid = match version {
            Some(name) if name != "latest" => self
                .find_version(name)
                .ok_or_else(|| PackError::VersionNotFound(name.to_string()))?,
            _ => {
                let referenced: HashSet<VersionId> =
                    self.versions.iter().filter_map(|v| v.previous).collect();
                let mut leaves = (0..self.versions.len())
                    .map(|idx| VersionId(idx as u32))
                    .filter(|vid| !referenced.contains(vid));
                let first = leaves
                    .next()
                    .ok_or_else(|| PackError::VersionNotFound("latest".into()))?;
                if let Some(second) = leaves.next() {
                    return Err(PackError::AmbiguousLatest(
                        self.versions[first.index()].name.clone(),
                        self.versions[second.index()].name.clone(),
                    ));
                }
                first
            }
        };

        let version_name = self.versions[vid.index()].name.clone();
        let mut items = Vec::new();
        for &iid in &self.versions[vid.index()].items {
            let item = &self.items[iid.index()];
            if item.is_deleted() {
                continue;
            }
            let implementing = item.implementing.ok_or_else(|| PackError::UnresolvedAncestor {
                name: item.name.clone(),
                version: version_name.clone(),
            })?;
            items.push(ReleaseItem {
                name: item.name.clone(),
                item: implementing,
                type_name: self.type_name(implementing),
            });
        }
        Ok(Release {
            version: vid,
            version_name,
            items,
        })
    }

    fn version_name(&self, id: VersionId) -> &str {
        &self.versions[id.index()].name
    }

    fn push_item(&mut self, item: Item) -> ItemId {
        let id = ItemId(self.items.len() as u32);
        self.items.push(item);
        id
    }

    /// Start a version as an exact carry-over of its predecessor: one
    /// identical placeholder per non-deleted item, linked back to it
    fn seed_version(&mut self, name: String, previous: Option<VersionId>) -> VersionId {
        let vid = VersionId(self.versions.len() as u32);
        let mut items = Vec::new();
        if let Some(pid) = previous {
            let prev_items = self.versions[pid.index()].items.clone();
            for prev_iid in prev_items {
                let prev_item = &self.items[prev_iid.index()];
                if prev_item.is_deleted() {
                    continue;
                }
                let placeholder = Item {
                    name: prev_item.name.clone(),
                    kind: prev_item.kind,
                    provenance: Provenance::Identical,
                    deprecated: prev_item.deprecated,
                    variables: Vec::new(),
                    dependencies: Vec::new(),
                    templates: Vec::new(),
                    validations: Vec::new(),
                    mappings: Vec::new(),
                    version: vid,
                    previous: Some(prev_iid),
                    implementing: None,
                };
                items.push(self.push_item(placeholder));
            }
        }
        self.versions.push(Version {
            name,
            previous,
            items,
            modifications: Vec::new(),
        });
        vid
    }

    fn apply(&mut self, vid: VersionId, modification: &Modification) -> Result<()> {
        match modification {
            Modification::AddItem {
                name,
                variables,
                dependencies,
                templates,
                validations,
            } => self.add_item(
                vid,
                name,
                ItemKind::Item,
                variables,
                dependencies,
                templates,
                validations,
            ),
            Modification::AddEntity {
                name,
                variables,
                dependencies,
                templates,
                validations,
            } => self.add_item(
                vid,
                name,
                ItemKind::Entity,
                variables,
                dependencies,
                templates,
                validations,
            ),
            Modification::DeleteItem { name } | Modification::DeleteEntity { name } => {
                self.delete_item(vid, name)
            }
            Modification::ModifyItem {
                name,
                add_variables,
                remove_variables,
                rename_variables,
                add_dependencies,
                remove_dependencies,
                add_templates,
                remove_templates,
                add_validations,
                remove_validations,
                mappings,
            }
            | Modification::ModifyEntity {
                name,
                add_variables,
                remove_variables,
                rename_variables,
                add_dependencies,
                remove_dependencies,
                add_templates,
                remove_templates,
                add_validations,
                remove_validations,
                mappings,
            } => self.modify_item(
                vid,
                name,
                add_variables,
                remove_variables,
                rename_variables,
                add_dependencies,
                remove_dependencies,
                add_templates,
                remove_templates,
                add_validations,
                remove_validations,
                mappings,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_item(
        &mut self,
        vid: VersionId,
        name: &str,
        kind: ItemKind,
        variables: &[Variable],
        dependencies: &[Dependency],
        templates: &[Template],
        validations: &[Validation],
    ) -> Result<()> {
        if self.find_item(vid, name).is_some() {
            return Err(PackError::ItemExists {
                name: name.to_string(),
                version: self.version_name(vid).to_string(),
            });
        }
        let item = Item {
            name: name.to_string(),
            kind,
            provenance: Provenance::New,
            deprecated: false,
            variables: variables.to_vec(),
            dependencies: dependencies.to_vec(),
            templates: templates.to_vec(),
            validations: validations.to_vec(),
            mappings: Vec::new(),
            version: vid,
            previous: None,
            implementing: None,
        };
        let id = self.push_item(item);
        self.versions[vid.index()].items.push(id);
        Ok(())
    }

    /// Replace the item with a tombstone that keeps the predecessor link
    fn delete_item(&mut self, vid: VersionId, name: &str) -> Result<()> {
        let iid = self.find_item(vid, name).ok_or_else(|| PackError::ItemNotFound {
            name: name.to_string(),
            version: self.version_name(vid).to_string(),
        })?;
        let item = &self.items[iid.index()];
        if item.is_deleted() {
            return Err(PackError::ItemDeleted {
                name: name.to_string(),
                version: self.version_name(vid).to_string(),
            });
        }
        let tombstone = Item {
            name: item.name.clone(),
            kind: item.kind,
            provenance: Provenance::Deleted,
            deprecated: item.deprecated,
            variables: Vec::new(),
            dependencies: Vec::new(),
            templates: Vec::new(),
            validations: Vec::new(),
            mappings: Vec::new(),
            version: vid,
            previous: item.previous,
            implementing: None,
        };
        let new_id = self.push_item(tombstone);
        let version = &mut self.versions[vid.index()];
        version.items.retain(|id| *id != iid);
        version.items.push(new_id);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn modify_item(
        &mut self,
        vid: VersionId,
        name: &str,
        add_variables: &[Variable],
        remove_variables: &[String],
        rename_variables: &[(String, String)],
        add_dependencies: &[Dependency],
        remove_dependencies: &[String],
        add_templates: &[Template],
        remove_templates: &[String],
        add_validations: &[Validation],
        remove_validations: &[String],
        mappings: &[Mapping],
    ) -> Result<()> {
        let version_name = self.version_name(vid).to_string();
        let iid = self
            .find_item(vid, name)
            .ok_or_else(|| PackError::ItemDeleted {
                name: name.to_string(),
                version: version_name.clone(),
            })?;
        let item = &self.items[iid.index()];
        if item.is_deleted() {
            return Err(PackError::ItemDeleted {
                name: name.to_string(),
                version: version_name,
            });
        }
        if !item.is_identical() {
            return Err(PackError::AlreadyModified {
                name: name.to_string(),
                version: version_name,
            });
        }
        let immediate_previous = item.previous.ok_or_else(|| PackError::UnresolvedAncestor {
            name: name.to_string(),
            version: version_name.clone(),
        })?;

        // the placeholder may alias an aliasing predecessor; copy from the
        // nearest concrete ancestor
        let mut ancestor = immediate_previous;
        while self.items[ancestor.index()].is_identical() {
            ancestor = self.items[ancestor.index()].previous.ok_or_else(|| {
                PackError::UnresolvedAncestor {
                    name: name.to_string(),
                    version: version_name.clone(),
                }
            })?;
        }
        let source = self.items[ancestor.index()].clone();

        let mut modified = Item {
            name: name.to_string(),
            kind: source.kind,
            provenance: Provenance::Modified,
            deprecated: source.deprecated,
            variables: source.variables,
            dependencies: source.dependencies,
            templates: source.templates,
            validations: source.validations,
            mappings: Vec::new(),
            version: vid,
            previous: Some(immediate_previous),
            implementing: None,
        };

        // every existing variable starts as a straight carry-over
        modified.mappings = modified
            .variables
            .iter()
            .map(|v| Mapping::Same {
                name: v.name.clone(),
                previous: v.name.clone(),
            })
            .collect();

        for variable in add_variables {
            if modified.find_variable(&variable.name).is_some() {
                return Err(PackError::VariableExists {
                    variable: variable.name.clone(),
                    item: name.to_string(),
                    version: version_name.clone(),
                });
            }
            modified.mappings.push(Mapping::New {
                name: variable.name.clone(),
            });
            modified.variables.push(variable.clone());
        }

        for variable_name in remove_variables {
            let position = modified
                .variables
                .iter()
                .position(|v| &v.name == variable_name)
                .ok_or_else(|| PackError::VariableNotFound {
                    variable: variable_name.clone(),
                    item: name.to_string(),
                    version: version_name.clone(),
                })?;
            modified.variables.remove(position);
            if let Some(mapping_pos) = modified
                .mappings
                .iter()
                .position(|m| m.name() == variable_name.as_str())
            {
                let replacement = match &modified.mappings[mapping_pos] {
                    Mapping::Same { previous, .. } => Some(Mapping::Deleted {
                        previous: previous.clone(),
                    }),
                    // a variable added and removed in the same modification
                    // leaves no trace in either version
                    _ => None,
                };
                match replacement {
                    Some(mapping) => modified.mappings[mapping_pos] = mapping,
                    None => {
                        modified.mappings.remove(mapping_pos);
                    }
                }
            }
        }

        for (old_name, new_name) in rename_variables {
            let variable = modified
                .variables
                .iter_mut()
                .find(|v| &v.name == old_name)
                .ok_or_else(|| PackError::VariableNotFound {
                    variable: old_name.clone(),
                    item: name.to_string(),
                    version: version_name.clone(),
                })?;
            // keep the wire key on the original name so stored data stays
            // readable
            if variable.storage_name.is_none() {
                variable.storage_name = Some(old_name.clone());
            }
            variable.name = new_name.clone();
            match modified
                .mappings
                .iter_mut()
                .find(|m| m.name() == old_name.as_str())
            {
                Some(Mapping::Same { name, .. }) => *name = new_name.clone(),
                Some(Mapping::New { name }) => *name = new_name.clone(),
                Some(Mapping::Custom { name, .. }) => *name = new_name.clone(),
                Some(Mapping::Deleted { .. }) => {}
                None => modified.mappings.push(Mapping::Same {
                    name: new_name.clone(),
                    previous: old_name.clone(),
                }),
            }
        }

        modified
            .dependencies
            .extend(add_dependencies.iter().cloned());
        modified
            .dependencies
            .retain(|d| !remove_dependencies.contains(&d.name));
        modified.templates.extend(add_templates.iter().cloned());
        modified
            .templates
            .retain(|t| !remove_templates.contains(&t.name));
        modified
            .validations
            .extend(add_validations.iter().cloned());
        modified
            .validations
            .retain(|v| !remove_validations.contains(&v.label()));

        // explicit mappings replace same-named defaults
        for mapping in mappings {
            modified.mappings.retain(|m| m.name() != mapping.name());
            modified.mappings.push(mapping.clone());
        }

        let new_id = self.push_item(modified);
        let version = &mut self.versions[vid.index()];
        version.items.retain(|id| *id != iid);
        version.items.push(new_id);
        Ok(())
    }

    /// Whole-history validation, run once after every version exists
    fn validate(&mut self) -> Result<()> {
        // every non-deleted item of a predecessor must survive into the
        // next version with the same kind, unless explicitly deleted there
        for version in &self.versions {
            if let Some(pid) = version.previous {
                for &prev_iid in &self.versions[pid.index()].items {
                    let prev_item = &self.items[prev_iid.index()];
                    if prev_item.is_deleted() {
                        continue;
                    }
                    let found = version
                        .items
                        .iter()
                        .find(|id| self.items[id.index()].name == prev_item.name);
                    match found {
                        None => {
                            return Err(PackError::ItemOmitted {
                                name: prev_item.name.clone(),
                                version: version.name.clone(),
                            })
                        }
                        Some(&iid) if self.items[iid.index()].kind != prev_item.kind => {
                            return Err(PackError::KindMismatch {
                                name: prev_item.name.clone(),
                                version: version.name.clone(),
                            })
                        }
                        _ => {}
                    }
                }
            }
        }

        // every aliasing item must resolve to a concrete ancestor
        let mut resolutions = Vec::with_capacity(self.items.len());
        for (idx, item) in self.items.iter().enumerate() {
            let resolved = match item.provenance {
                Provenance::New | Provenance::Modified => Some(ItemId(idx as u32)),
                Provenance::Deleted => None,
                Provenance::Identical => {
                    let mut cursor = item.previous;
                    loop {
                        let cid = cursor.ok_or_else(|| PackError::UnresolvedAncestor {
                            name: item.name.clone(),
                            version: self.version_name(item.version).to_string(),
                        })?;
                        let candidate = &self.items[cid.index()];
                        if candidate.kind != item.kind {
                            return Err(PackError::KindMismatch {
                                name: item.name.clone(),
                                version: self.version_name(item.version).to_string(),
                            });
                        }
                        if candidate.is_deleted() {
                            return Err(PackError::UnresolvedAncestor {
                                name: item.name.clone(),
                                version: self.version_name(item.version).to_string(),
                            });
                        }
                        if candidate.is_concrete() {
                            break Some(cid);
                        }
                        cursor = candidate.previous;
                    }
                }
            };
            resolutions.push(resolved);
        }
        for (idx, resolved) in resolutions.into_iter().enumerate() {
            self.items[idx].implementing = resolved;
        }

        // the mappings of a modified item must cover exactly its variables
        for item in &self.items {
            if !item.is_modified() {
                continue;
            }
            let version = self.version_name(item.version);
            let covered: HashSet<&str> = item
                .mappings
                .iter()
                .filter_map(|m| m.current_name())
                .collect();
            for variable in &item.variables {
                if !covered.contains(variable.name.as_str()) {
                    return Err(PackError::UnmappedVariable {
                        variable: variable.name.clone(),
                        item: item.name.clone(),
                        version: version.to_string(),
                    });
                }
            }
            for mapping in &item.mappings {
                if let Some(current) = mapping.current_name() {
                    if item.find_variable(current).is_none() {
                        return Err(PackError::DanglingMapping {
                            mapping: current.to_string(),
                            item: item.name.clone(),
                            version: version.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
