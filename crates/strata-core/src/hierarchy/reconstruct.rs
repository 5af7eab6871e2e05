//! Rebuild a nested entity document from flat records.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::Hierarchy;
use super::record::{RecordParts, split_record};
use crate::entity::ChildKind;
use crate::error::{HierarchyError, Result, SchemaError};

type ChildIndex<'r> = HashMap<(&'r str, &'r str), Vec<usize>>;

impl Hierarchy<'_> {
    /// Nest `records` under their unique root.
    ///
    /// Children are grouped by parent id and parent field, keeping their
    /// order in `records`. Returns `Ok(None)` when no record is a root.
    /// Declared child fields without matching records are left absent so
    /// the target type's defaults apply.
    pub fn reconstruct_hierarchy(&self, records: Vec<Value>) -> Result<Option<Value>> {
        let index_attrs = self.config.index_attribute_names();
        let parts = records
            .into_iter()
            .map(|record| split_record(record, &index_attrs))
            .collect::<Result<Vec<RecordParts>>>()?;

        let mut children: ChildIndex<'_> = HashMap::new();
        let mut roots = Vec::new();
        for (position, part) in parts.iter().enumerate() {
            match &part.parent {
                Some(link) => children
                    .entry((link.id.as_str(), link.field.as_str()))
                    .or_default()
                    .push(position),
                None => roots.push(position),
            }
        }

        let root = match roots.as_slice() {
            [] => return Ok(None),
            [root] => *root,
            many => {
                return Err(HierarchyError::MultipleRoots {
                    ids: many.iter().map(|&i| parts[i].id.clone()).collect(),
                }
                .into());
            }
        };

        let mut visited = HashSet::new();
        let tree = self.assemble(root, &parts, &children, &mut visited)?;
        Ok(Some(tree))
    }

    fn assemble(
        &self,
        position: usize,
        parts: &[RecordParts],
        children: &ChildIndex<'_>,
        visited: &mut HashSet<usize>,
    ) -> Result<Value> {
        let part = &parts[position];
        if !visited.insert(position) {
            return Err(HierarchyError::MalformedRecord(format!(
                "record '{}' is reachable more than once",
                part.id
            ))
            .into());
        }
        let descriptor = self
            .catalog
            .get(&part.type_tag)
            .ok_or_else(|| SchemaError::UnknownEntityType(part.type_tag.clone()))?;

        let mut body: Map<String, Value> = part.body.clone();
        for field in descriptor.child_fields {
            let Some(members) = children.get(&(part.id.as_str(), field.name)) else {
                continue;
            };
            let value = match field.kind {
                ChildKind::List => Value::Array(
                    members
                        .iter()
                        .map(|&member| self.assemble(member, parts, children, visited))
                        .collect::<Result<Vec<_>>>()?,
                ),
                ChildKind::One | ChildKind::Optional => match members.as_slice() {
                    [member] => self.assemble(*member, parts, children, visited)?,
                    _ => {
                        return Err(HierarchyError::AmbiguousChild {
                            parent: part.id.clone(),
                            field: field.name.to_string(),
                            count: members.len(),
                        }
                        .into());
                    }
                },
            };
            body.insert(field.name.to_string(), value);
        }
        Ok(Value::Object(body))
    }
}
