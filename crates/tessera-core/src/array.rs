//! Named sample arrays owned by an instance.

use std::collections::HashMap;

use crate::atom::Symbol;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct Arrays {
    arrays: HashMap<Symbol, Vec<f32>>,
}

fn check_range(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::ArrayBounds { offset, len, size }),
    }
}

fn unknown(name: Symbol) -> Error {
    Error::UnknownArray(name.to_string())
}

impl Arrays {
    /// Creates or replaces an array of `size` zeros.
    pub fn create(&mut self, name: Symbol, size: usize) {
        self.arrays.insert(name, vec![0.0; size]);
    }

    pub fn remove(&mut self, name: Symbol) -> bool {
        self.arrays.remove(&name).is_some()
    }

    pub fn size(&self, name: Symbol) -> Result<usize> {
        self.get(name)
            .map(<[f32]>::len)
            .ok_or_else(|| unknown(name))
    }

    /// Resizes, keeping existing samples and zero-filling new ones.
    pub fn resize(&mut self, name: Symbol, size: usize) -> Result<()> {
        self.arrays
            .get_mut(&name)
            .ok_or_else(|| unknown(name))?
            .resize(size, 0.0);
        Ok(())
    }

    /// Copies `dest.len()` samples starting at `offset` into `dest`.
    pub fn read(&self, dest: &mut [f32], name: Symbol, offset: usize) -> Result<()> {
        let array = self.get(name).ok_or_else(|| unknown(name))?;
        check_range(offset, dest.len(), array.len())?;
        dest.copy_from_slice(&array[offset..offset + dest.len()]);
        Ok(())
    }

    /// Copies `src` into the array starting at `offset`.
    pub fn write(&mut self, name: Symbol, offset: usize, src: &[f32]) -> Result<()> {
        let array = self.get_mut(name).ok_or_else(|| unknown(name))?;
        check_range(offset, src.len(), array.len())?;
        array[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Lookup without building an error. Safe to call while processing.
    pub fn get(&self, name: Symbol) -> Option<&[f32]> {
        self.arrays.get(&name).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, name: Symbol) -> Option<&mut [f32]> {
        self.arrays.get_mut(&name).map(Vec::as_mut_slice)
    }

    pub fn clear(&mut self) {
        self.arrays.clear();
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}
