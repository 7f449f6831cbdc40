//! List handles.
//!
//! A [`FieldArray`] is a convenience wrapper around the list operations of
//! a [`FormController`] for one list path, the way a dynamic section of a
//! form (a list of phone numbers) is usually rendered: iterate
//! [`fields`](FieldArray::fields), keyed by [`ItemId`], with add and remove
//! buttons.

use serde::Serialize;

use formstate_core::FormResult;

use crate::controller::FormController;
use crate::path::FieldPath;
use crate::record::ItemId;

/// One item of a list, as seen when rendering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArrayField {
    /// Stable identity, suitable as a render key.
    pub id: ItemId,
    /// Current position.
    pub index: usize,
}

/// A handle for one list of a form.
#[derive(Debug, Clone)]
pub struct FieldArray {
    form: FormController,
    name: String,
}

impl FieldArray {
    pub(crate) fn new(form: FormController, path: FieldPath) -> Self {
        Self {
            form,
            name: path.to_string(),
        }
    }

    /// Returns the list path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the items in order.
    pub fn fields(&self) -> FormResult<Vec<ArrayField>> {
        Ok(self
            .form
            .list_ids(&self.name)?
            .into_iter()
            .enumerate()
            .map(|(index, id)| ArrayField { id, index })
            .collect())
    }

    /// Returns the number of items.
    pub fn len(&self) -> FormResult<usize> {
        Ok(self.form.list_ids(&self.name)?.len())
    }

    /// Returns `true` if the list has no items.
    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Appends an item.
    pub fn append(&self, item: serde_json::Value) -> FormResult<ItemId> {
        self.form.append_list_item(&self.name, item)
    }

    /// Removes the item at `index`.
    pub fn remove(&self, index: usize) -> FormResult<ItemId> {
        self.form.remove_list_item(&self.name, index)
    }

    /// Returns the path of a field within the item at `index`.
    pub fn field_path(&self, index: usize, field: &str) -> String {
        format!("{}.{index}.{field}", self.name)
    }
}
