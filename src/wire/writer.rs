//! Section-based record writer

use crate::containers::WireValue;
use crate::error::{PackError, Result};

use super::{WriteStream, FLAG_INDEXED, FLAG_PRESENT, TAG_SECTION, TAG_SECTIONS_ARRAY};

/// Token handed out by `begin_*` and validated by the matching `end_*`.
///
/// Ending a scope with a token that is not the currently active one is a
/// contract violation and fails the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub(crate) depth: usize,
}

#[derive(Debug)]
struct OpenElem {
    index: u32,
    size_slot: u64,
}

#[derive(Debug)]
enum Scope {
    Section {
        size_slot: u64,
    },
    Array {
        size_slot: u64,
        count: u32,
        completed: u32,
        open_elem: Option<OpenElem>,
    },
}

/// Writer for the section-based wire format.
///
/// Scopes nest as a stack; per scope, at most one child section or array
/// element is active at a time. All operations are synchronous and either
/// complete or fail; a failure aborts the write of the enclosing record.
#[derive(Debug, Default)]
pub struct RecordWriter {
    stream: WriteStream,
    scopes: Vec<Scope>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_key(&mut self, key: &str) -> Result<()> {
        if key.len() > u8::MAX as usize {
            return Err(PackError::InvalidParam(format!(
                "key too long: {} bytes (max 255)",
                key.len()
            )));
        }
        self.stream.write_u8(key.len() as u8);
        self.stream.write_bytes(key.as_bytes());
        Ok(())
    }

    /// A sections array only accepts content between begin/end of an element
    fn check_writable(&self) -> Result<()> {
        if let Some(Scope::Array {
            open_elem: None, ..
        }) = self.scopes.last()
        {
            return Err(PackError::CantWrite(
                "a sections array is active; open an array element before writing".into(),
            ));
        }
        Ok(())
    }

    /// Open a labeled sub-region. Must be closed with [`end_section`].
    ///
    /// [`end_section`]: RecordWriter::end_section
    pub fn begin_section(&mut self, key: &str) -> Result<Section> {
        self.check_writable()?;
        self.write_key(key)?;
        self.stream.write_u8(TAG_SECTION);
        self.stream.write_u8(FLAG_PRESENT);
        let size_slot = self.stream.reserve_u64();
        self.scopes.push(Scope::Section { size_slot });
        Ok(Section {
            depth: self.scopes.len(),
        })
    }

    /// Close the most recently opened section
    pub fn end_section(&mut self, section: Section) -> Result<()> {
        if section.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "section token does not match the currently active scope".into(),
            ));
        }
        match self.scopes.last() {
            Some(Scope::Section { size_slot }) => {
                let size = self.stream.position() - (size_slot + 8);
                let slot = *size_slot;
                self.stream.patch_u64(slot, size);
                self.scopes.pop();
                Ok(())
            }
            _ => Err(PackError::InvalidParam(
                "the active scope is not a section".into(),
            )),
        }
    }

    /// Write a tombstone marker in place of an absent optional section
    pub fn write_null_section(&mut self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.write_key(key)?;
        self.stream.write_u8(TAG_SECTION);
        self.stream.write_u8(0);
        self.stream.write_u64(0);
        Ok(())
    }

    /// Open an array of `count` sections. When `index` is given it stores a
    /// sparse u32 index alongside the dense elements; its length must equal
    /// `count`.
    pub fn begin_sections_array(
        &mut self,
        key: &str,
        count: u32,
        index: Option<&[u32]>,
    ) -> Result<Section> {
        self.check_writable()?;
        if let Some(index) = index {
            if index.len() != count as usize {
                return Err(PackError::InvalidParam(format!(
                    "index length {} does not match element count {}",
                    index.len(),
                    count
                )));
            }
        }
        self.write_key(key)?;
        self.stream.write_u8(TAG_SECTIONS_ARRAY);
        let mut flags = FLAG_PRESENT;
        if index.is_some() {
            flags |= FLAG_INDEXED;
        }
        self.stream.write_u8(flags);
        let size_slot = self.stream.reserve_u64();
        self.stream.write_u32(count);
        if let Some(index) = index {
            for entry in index {
                self.stream.write_u32(*entry);
            }
        }
        self.scopes.push(Scope::Array {
            size_slot,
            count,
            completed: 0,
            open_elem: None,
        });
        Ok(Section {
            depth: self.scopes.len(),
        })
    }

    /// Open array element `index`. Elements are written strictly in order.
    pub fn begin_section_in_array(&mut self, array: Section, index: u32) -> Result<()> {
        if array.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "array token does not match the currently active scope".into(),
            ));
        }
        let stream = &mut self.stream;
        match self.scopes.last_mut() {
            Some(Scope::Array {
                count,
                completed,
                open_elem,
                ..
            }) => {
                if open_elem.is_some() {
                    return Err(PackError::CantWrite(
                        "an array element is already open; close it first".into(),
                    ));
                }
                if index != *completed {
                    return Err(PackError::InvalidParam(format!(
                        "out-of-sync array element index {index}, expected {completed}"
                    )));
                }
                if index >= *count {
                    return Err(PackError::InvalidParam(format!(
                        "array element index {index} out of range (count {count})"
                    )));
                }
                let size_slot = stream.reserve_u64();
                *open_elem = Some(OpenElem { index, size_slot });
                Ok(())
            }
            _ => Err(PackError::InvalidParam(
                "the active scope is not a sections array".into(),
            )),
        }
    }

    /// Close array element `index`
    pub fn end_section_in_array(&mut self, array: Section, index: u32) -> Result<()> {
        if array.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "array token does not match the currently active scope".into(),
            ));
        }
        let position = self.stream.position();
        match self.scopes.last_mut() {
            Some(Scope::Array {
                completed,
                open_elem,
                ..
            }) => match open_elem {
                Some(elem) if elem.index == index => {
                    let size = position - (elem.size_slot + 8);
                    let slot = elem.size_slot;
                    *open_elem = None;
                    *completed += 1;
                    self.stream.patch_u64(slot, size);
                    Ok(())
                }
                Some(elem) => Err(PackError::InvalidParam(format!(
                    "out-of-sync array element index {index}, expected {}",
                    elem.index
                ))),
                None => Err(PackError::CantWrite("no array element is open".into())),
            },
            _ => Err(PackError::InvalidParam(
                "the active scope is not a sections array".into(),
            )),
        }
    }

    /// Close the sections array; every element must have been written
    pub fn end_sections_array(&mut self, array: Section) -> Result<()> {
        if array.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "array token does not match the currently active scope".into(),
            ));
        }
        match self.scopes.last() {
            Some(Scope::Array {
                size_slot,
                count,
                completed,
                open_elem,
            }) => {
                if open_elem.is_some() {
                    return Err(PackError::CantWrite(
                        "an array element is still open".into(),
                    ));
                }
                if completed != count {
                    return Err(PackError::CantWrite(format!(
                        "sections array closed after {completed} of {count} elements"
                    )));
                }
                let size = self.stream.position() - (size_slot + 8);
                let slot = *size_slot;
                self.stream.patch_u64(slot, size);
                self.scopes.pop();
                Ok(())
            }
            _ => Err(PackError::InvalidParam(
                "the active scope is not a sections array".into(),
            )),
        }
    }

    /// Write a tombstone marker in place of an absent optional array
    pub fn write_null_sections_array(&mut self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.write_key(key)?;
        self.stream.write_u8(TAG_SECTIONS_ARRAY);
        self.stream.write_u8(0);
        self.stream.write_u64(0);
        Ok(())
    }

    /// Write one value block for a concrete value type
    pub fn write<V: WireValue>(&mut self, key: &str, value: &V) -> Result<()> {
        self.check_writable()?;
        self.write_key(key)?;
        self.stream.write_u8(V::COMBO.element.id());
        self.stream.write_u8(V::COMBO.container.id());
        value.wire_write(&mut self.stream);
        Ok(())
    }

    /// Finish writing; fails if any scope is still open
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if !self.scopes.is_empty() {
            return Err(PackError::CantWrite(format!(
                "{} scope(s) left open at end of record",
                self.scopes.len()
            )));
        }
        Ok(self.stream.into_bytes())
    }
}
