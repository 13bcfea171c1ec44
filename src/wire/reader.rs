//! Section-based record reader

use crate::containers::WireValue;
use crate::error::{PackError, Result};

use super::writer::Section;
use super::{ReadStream, FLAG_INDEXED, FLAG_PRESENT, TAG_SECTION, TAG_SECTIONS_ARRAY};

/// Header of an open sections array
#[derive(Debug)]
pub struct ArrayHeader {
    pub token: Section,
    pub count: u32,
    /// Sparse index, present only for indexed variants
    pub index: Option<Vec<u32>>,
}

#[derive(Debug)]
struct OpenElem {
    index: u32,
    end: u64,
}

#[derive(Debug)]
enum Scope {
    Section {
        end: u64,
    },
    Array {
        end: u64,
        count: u32,
        completed: u32,
        open_elem: Option<OpenElem>,
    },
}

/// Reader mirroring every [`RecordWriter`] operation.
///
/// [`RecordWriter`]: super::RecordWriter
#[derive(Debug)]
pub struct RecordReader<'a> {
    stream: ReadStream<'a>,
    scopes: Vec<Scope>,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            stream: ReadStream::new(bytes),
            scopes: Vec::new(),
        }
    }

    fn read_key(&mut self, expected: &str) -> Result<()> {
        let len = self.stream.read_u8()? as usize;
        let bytes = self.stream.read_bytes(len)?;
        if bytes != expected.as_bytes() {
            return Err(PackError::CantRead(format!(
                "key mismatch: expected \"{}\", found \"{}\"",
                expected,
                String::from_utf8_lossy(bytes)
            )));
        }
        Ok(())
    }

    fn read_tag(&mut self, expected: u8) -> Result<()> {
        let tag = self.stream.read_u8()?;
        if tag != expected {
            return Err(PackError::CantRead(format!(
                "block tag mismatch: expected {expected:#04x}, found {tag:#04x}"
            )));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        if let Some(Scope::Array {
            open_elem: None, ..
        }) = self.scopes.last()
        {
            return Err(PackError::CantRead(
                "a sections array is active; open an array element before reading".into(),
            ));
        }
        Ok(())
    }

    /// Open a labeled sub-region.
    ///
    /// Returns `None` exactly when the writer emitted a null tombstone and
    /// `allow_null` was requested; a tombstone without `allow_null` is a
    /// read failure. A `None` return closes the section implicitly and
    /// [`end_section`] must not be called for it.
    ///
    /// [`end_section`]: RecordReader::end_section
    pub fn begin_section(&mut self, key: &str, allow_null: bool) -> Result<Option<Section>> {
        self.check_readable()?;
        self.read_key(key)?;
        self.read_tag(TAG_SECTION)?;
        let flags = self.stream.read_u8()?;
        let size = self.stream.read_u64()?;
        if flags & FLAG_PRESENT == 0 {
            if size != 0 {
                return Err(PackError::CantRead(format!(
                    "null section \"{key}\" has nonzero size {size}"
                )));
            }
            if !allow_null {
                return Err(PackError::CantRead(format!(
                    "unexpected null section \"{key}\""
                )));
            }
            return Ok(None);
        }
        let end = self.stream.position() + size;
        if end > self.stream.size() {
            return Err(PackError::CantRead(format!(
                "section \"{key}\" size {size} exceeds the stream"
            )));
        }
        self.scopes.push(Scope::Section { end });
        Ok(Some(Section {
            depth: self.scopes.len(),
        }))
    }

    /// Close the most recently opened section; the payload must have been
    /// consumed exactly
    pub fn end_section(&mut self, section: Section) -> Result<()> {
        if section.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "section token does not match the currently active scope".into(),
            ));
        }
        match self.scopes.last() {
            Some(Scope::Section { end }) => {
                if self.stream.position() != *end {
                    return Err(PackError::CantRead(format!(
                        "section closed at position {} but ends at {}; reading is out of sync",
                        self.stream.position(),
                        end
                    )));
                }
                self.scopes.pop();
                Ok(())
            }
            _ => Err(PackError::InvalidParam(
                "the active scope is not a section".into(),
            )),
        }
    }

    /// Open an array of sections.
    ///
    /// Returns `None` for an allowed null tombstone, otherwise the header
    /// with the element count and the sparse index when one was written.
    pub fn begin_sections_array(
        &mut self,
        key: &str,
        allow_null: bool,
    ) -> Result<Option<ArrayHeader>> {
        self.check_readable()?;
        self.read_key(key)?;
        self.read_tag(TAG_SECTIONS_ARRAY)?;
        let flags = self.stream.read_u8()?;
        let size = self.stream.read_u64()?;
        if flags & FLAG_PRESENT == 0 {
            if size != 0 {
                return Err(PackError::CantRead(format!(
                    "null sections array \"{key}\" has nonzero size {size}"
                )));
            }
            if !allow_null {
                return Err(PackError::CantRead(format!(
                    "unexpected null sections array \"{key}\""
                )));
            }
            return Ok(None);
        }
        let end = self.stream.position() + size;
        if end > self.stream.size() {
            return Err(PackError::CantRead(format!(
                "sections array \"{key}\" size {size} exceeds the stream"
            )));
        }
        let count = self.stream.read_u32()?;
        let index = if flags & FLAG_INDEXED != 0 {
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(self.stream.read_u32()?);
            }
            Some(entries)
        } else {
            None
        };
        self.scopes.push(Scope::Array {
            end,
            count,
            completed: 0,
            open_elem: None,
        });
        Ok(Some(ArrayHeader {
            token: Section {
                depth: self.scopes.len(),
            },
            count,
            index,
        }))
    }

    /// Open array element `index`, strictly in order.
    ///
    /// Returns whether the element carries data; an empty slot still needs
    /// its matching [`end_section_in_array`] call.
    ///
    /// [`end_section_in_array`]: RecordReader::end_section_in_array
    pub fn begin_section_in_array(&mut self, array: Section, index: u32) -> Result<bool> {
        if array.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "array token does not match the currently active scope".into(),
            ));
        }
        let size = match self.scopes.last() {
            Some(Scope::Array {
                count,
                completed,
                open_elem,
                ..
            }) => {
                if open_elem.is_some() {
                    return Err(PackError::CantRead(
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
                self.stream.read_u64()?
            }
            _ => {
                return Err(PackError::InvalidParam(
                    "the active scope is not a sections array".into(),
                ))
            }
        };
        let end = self.stream.position() + size;
        if end > self.stream.size() {
            return Err(PackError::CantRead(format!(
                "array element {index} size {size} exceeds the stream"
            )));
        }
        if let Some(Scope::Array { open_elem, .. }) = self.scopes.last_mut() {
            *open_elem = Some(OpenElem { index, end });
        }
        Ok(size != 0)
    }

    /// Close array element `index`; its payload must have been consumed
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
                    if position != elem.end {
                        return Err(PackError::CantRead(format!(
                            "array element {index} closed at position {position} but ends at {}; reading is out of sync",
                            elem.end
                        )));
                    }
                    *open_elem = None;
                    *completed += 1;
                    Ok(())
                }
                Some(elem) => Err(PackError::InvalidParam(format!(
                    "out-of-sync array element index {index}, expected {}",
                    elem.index
                ))),
                None => Err(PackError::CantRead("no array element is open".into())),
            },
            _ => Err(PackError::InvalidParam(
                "the active scope is not a sections array".into(),
            )),
        }
    }

    /// Close the sections array; every element must have been read
    pub fn end_sections_array(&mut self, array: Section) -> Result<()> {
        if array.depth != self.scopes.len() {
            return Err(PackError::InvalidParam(
                "array token does not match the currently active scope".into(),
            ));
        }
        match self.scopes.last() {
            Some(Scope::Array {
                end,
                count,
                completed,
                open_elem,
            }) => {
                if open_elem.is_some() {
                    return Err(PackError::CantRead("an array element is still open".into()));
                }
                if completed != count {
                    return Err(PackError::CantRead(format!(
                        "sections array closed after {completed} of {count} elements"
                    )));
                }
                if self.stream.position() != *end {
                    return Err(PackError::CantRead(
                        "sections array end position does not match; reading is out of sync"
                            .into(),
                    ));
                }
                self.scopes.pop();
                Ok(())
            }
            _ => Err(PackError::InvalidParam(
                "the active scope is not a sections array".into(),
            )),
        }
    }

    /// Read one value block for a concrete value type, validating the key
    /// and the type combo written alongside the payload
    pub fn read<V: WireValue>(&mut self, key: &str) -> Result<V> {
        self.check_readable()?;
        self.read_key(key)?;
        let element = self.stream.read_u8()?;
        let container = self.stream.read_u8()?;
        if element != V::COMBO.element.id() || container != V::COMBO.container.id() {
            return Err(PackError::CantRead(format!(
                "value type mismatch for \"{}\": expected {}, found ({element:#04x}, {container:#04x})",
                key,
                V::COMBO
            )));
        }
        V::wire_read(&mut self.stream)
    }

    /// Whether the whole stream has been consumed
    pub fn at_end(&self) -> bool {
        self.scopes.is_empty() && self.stream.position() == self.stream.size()
    }
}
