//! Shared removal and insertion engine behind `rm`, `cp` and `mv`:
//! a selection-driven transducer that deletes selected subtrees or
//! threads an insert payload into the output at selection boundaries.

use std::io::Write;
use std::path::Path;

use bitflags::bitflags;
use tracing::warn;

use crate::attlist::AttributeList;
use crate::entities::push_coded_entities;
use crate::error::XmlkitError;
use crate::rollback::RollbackFile;
use crate::stdparse::StdState;
use crate::token::Tokenizer;
use crate::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RcmFlags: u16 {
        /// Emit everything outside selected subtrees (deletion mode).
        const RM_OUTPUT = 1 << 0;
        /// Emit everything, inserting the payload at selections.
        const CP_OUTPUT = 1 << 1;
        const CP_PREPEND = 1 << 2;
        const CP_REPLACE = 1 << 3;
        const CP_APPEND = 1 << 4;
        /// Insert at every selection, not only the first.
        const CP_MULTI = 1 << 5;
        /// Payload is well-formed XML; REPLACE drops the selected
        /// element's own tags instead of keeping them as a wrapper.
        const CP_WFXML = 1 << 6;
        /// Route output to the target file under rollback.
        const WRITE_FILES = 1 << 7;
    }
}

enum Sink {
    Null,
    Writer(Box<dyn Write>),
    Rollback(RollbackFile),
}

pub struct Rcm {
    pub flags: RcmFlags,
    progname: &'static str,
    /// Nesting depth within the current selection.
    depth: usize,
    select_open: bool,
    insert_done: bool,
    insert: Option<Vec<u8>>,
    sink: Sink,
}

impl Rcm {
    pub fn new(progname: &'static str) -> Self {
        Rcm {
            flags: RcmFlags::empty(),
            progname,
            depth: 0,
            select_open: false,
            insert_done: false,
            insert: None,
            sink: Sink::Null,
        }
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.select_open = false;
        self.insert_done = false;
    }

    /// Attach the insert payload. The payload is probed with a strict
    /// tokenizer; a well-formed document enables WFXML replacement.
    pub fn set_insert(&mut self, payload: Vec<u8>) {
        if payload.is_empty() {
            warn!("source data is empty! (check paths?)");
        } else if is_well_formed(&payload) {
            self.flags |= RcmFlags::CP_WFXML;
        }
        self.insert = Some(payload);
    }

    pub fn insert_consumed(&self) -> bool {
        self.insert_done
    }

    /// Route output to an arbitrary writer (stdout, a test buffer).
    pub fn set_writer(&mut self, w: Box<dyn Write>) {
        self.sink = Sink::Writer(w);
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.sink {
            Sink::Null => Ok(()),
            Sink::Writer(w) => Ok(w.write_all(data)?),
            Sink::Rollback(f) => Ok(f.write_all(data)?),
        }
    }

    fn write_coded(&mut self, data: &[u8]) -> Result<()> {
        let mut coded = Vec::with_capacity(data.len());
        push_coded_entities(&mut coded, data);
        self.write(&coded)
    }

    fn write_start_tag(&mut self, name: &str, attrs: &[(String, String)]) -> Result<()> {
        let mut out = Vec::new();
        out.push(b'<');
        out.extend_from_slice(name.as_bytes());
        for (k, v) in attrs {
            out.push(b' ');
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b"=\"");
            push_coded_entities(&mut out, v.as_bytes());
            out.push(b'"');
        }
        out.push(b'>');
        self.write(&out)
    }

    fn write_end_tag(&mut self, name: &str) -> Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(b"</");
        out.extend_from_slice(name.as_bytes());
        out.push(b'>');
        self.write(&out)
    }

    /// Open the per-file output. Under WRITE_FILES the file itself is
    /// rewritten through a rollback temp; mode output flags switch on.
    pub fn start_file(&mut self, file: &str, cp_mode: bool) -> Result<()> {
        self.reset();
        if self.flags.contains(RcmFlags::WRITE_FILES) {
            let rb = RollbackFile::open(Path::new(file), self.progname)
                .map_err(|_| XmlkitError::Rollback(file.into()))?;
            self.sink = Sink::Rollback(rb);
            self.flags |= if cp_mode {
                RcmFlags::CP_OUTPUT
            } else {
                RcmFlags::RM_OUTPUT
            };
        }
        Ok(())
    }

    /// Commit and close the per-file output. A plain writer is flushed
    /// and kept for the next file.
    pub fn end_file(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.sink, Sink::Null) {
            Sink::Rollback(mut rb) => {
                rb.flush()?;
                rb.commit();
                rb.close()?;
            }
            Sink::Writer(mut w) => {
                w.flush()?;
                self.sink = Sink::Writer(w);
            }
            Sink::Null => {}
        }
        Ok(())
    }

    // --- deletion mode -------------------------------------------------

    /// Attributes kept in deletion mode: those NOT covered by an
    /// attribute selection (the selected ones are being removed).
    fn filter_attrs(&self, state: &StdState, attrs: &AttributeList) -> Vec<(String, String)> {
        if !state.sel.attrib {
            return attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
        let path = state.path.as_str();
        attrs
            .iter()
            .filter(|(name, _)| !state.sel.check_attribute(path, name))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn rm_start_tag(
        &mut self,
        state: &StdState,
        name: &str,
        attrs: &AttributeList,
    ) -> Result<()> {
        if (state.depth == 1 || !state.sel.active) && self.flags.contains(RcmFlags::RM_OUTPUT) {
            let kept = self.filter_attrs(state, attrs);
            self.write_start_tag(name, &kept)?;
        }
        Ok(())
    }

    pub fn rm_end_tag(&mut self, state: &StdState, name: &str) -> Result<()> {
        if (state.depth == 1 || !state.sel.active) && self.flags.contains(RcmFlags::RM_OUTPUT) {
            self.write_end_tag(name)?;
        }
        Ok(())
    }

    pub fn rm_chardata(&mut self, state: &StdState, text: &str) -> Result<()> {
        if (state.depth == 0 || !state.sel.active) && self.flags.contains(RcmFlags::RM_OUTPUT) {
            self.write_coded(text.as_bytes())?;
        }
        Ok(())
    }

    pub fn rm_default(&mut self, state: &StdState, raw: &[u8]) -> Result<()> {
        if (state.depth == 0 || !state.sel.active) && self.flags.contains(RcmFlags::RM_OUTPUT) {
            self.write(raw)?;
        }
        Ok(())
    }

    // --- copy mode -----------------------------------------------------

    fn start_of_selection(&mut self) -> bool {
        if self.depth == 1 && !self.select_open {
            self.select_open = true;
            true
        } else {
            false
        }
    }

    fn end_of_selection(&mut self) -> bool {
        if self.depth <= 1 && self.select_open {
            self.select_open = false;
            true
        } else {
            false
        }
    }

    /// Write the payload once per selection (or once overall).
    fn try_write(&mut self) -> Result<()> {
        if self.insert.is_some() && !self.insert_done {
            self.insert_done = true;
            let payload = self.insert.clone().unwrap();
            self.write(&payload)?;
            if self.flags.contains(RcmFlags::CP_MULTI) {
                self.insert_done = false;
            }
        }
        Ok(())
    }

    /// Substitute the payload into attribute values selected by a
    /// trailing `@name` pattern.
    fn try_write_attribute(
        &mut self,
        state: &StdState,
        attrs: &AttributeList,
    ) -> Vec<(String, String)> {
        let insert = match (&self.insert, self.insert_done) {
            (Some(p), false) => p.clone(),
            _ => {
                return attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            }
        };
        let mut replaced: Vec<(String, String)> = Vec::new();
        for name in state.sel.matching_attribute_selectors(state.path.as_str()) {
            if !self.insert_done {
                self.insert_done = true;
                let value = String::from_utf8_lossy(&insert).into_owned();
                replaced.push((name, value));
                if self.flags.contains(RcmFlags::CP_MULTI) {
                    self.insert_done = false;
                }
            }
        }
        let mut out = replaced.clone();
        for (k, v) in attrs.iter() {
            if !out.iter().any(|(name, _)| name == k) {
                out.push((k.to_string(), v.to_string()));
            }
        }
        out
    }

    /// A well-formed payload replaces the whole selected element; a
    /// fragment payload replaces only its content, keeping the tags as
    /// a wrapper.
    fn replace_suppresses_tags(&self, state: &StdState) -> bool {
        state.sel.active
            && self.flags.contains(RcmFlags::CP_REPLACE)
            && self.flags.contains(RcmFlags::CP_WFXML)
    }

    pub fn cp_start_tag(
        &mut self,
        state: &StdState,
        name: &str,
        attrs: &AttributeList,
    ) -> Result<()> {
        if state.sel.active {
            self.depth += 1;
        }
        if self.flags.contains(RcmFlags::CP_OUTPUT) {
            let fatt = self.try_write_attribute(state, attrs);
            if !self.replace_suppresses_tags(state) {
                self.write_start_tag(name, &fatt)?;
            }
            if self.start_of_selection()
                && self
                    .flags
                    .intersects(RcmFlags::CP_PREPEND | RcmFlags::CP_REPLACE)
            {
                self.try_write()?;
            }
        }
        Ok(())
    }

    pub fn cp_end_tag(&mut self, state: &StdState, name: &str) -> Result<()> {
        if self.flags.contains(RcmFlags::CP_OUTPUT) {
            let eos = self.end_of_selection();
            if eos && self.flags.contains(RcmFlags::CP_APPEND) {
                self.try_write()?;
            }
            if state.depth == 1 && state.sel.active {
                self.try_write()?;
            }
            if !self.replace_suppresses_tags(state) {
                self.write_end_tag(name)?;
            }
            if eos && !self.flags.contains(RcmFlags::CP_MULTI) {
                self.flags.remove(RcmFlags::CP_REPLACE);
            }
        }
        if state.sel.active {
            self.depth = self.depth.saturating_sub(1);
        }
        Ok(())
    }

    pub fn cp_chardata(&mut self, state: &StdState, text: &str) -> Result<()> {
        if state.sel.active {
            self.depth += 1;
        }
        if self.flags.contains(RcmFlags::CP_OUTPUT) {
            if self.depth == 1 && !self.select_open {
                // selection starting inside chardata behaves as if it
                // started at the surrounding tag; the extra depth is
                // paid back by that tag's end-tag
                self.select_open = true;
                self.depth += 1;
                if self
                    .flags
                    .intersects(RcmFlags::CP_PREPEND | RcmFlags::CP_REPLACE)
                {
                    self.try_write()?;
                }
            }
            if !(state.sel.active && self.flags.contains(RcmFlags::CP_REPLACE)) {
                self.write_coded(text.as_bytes())?;
            }
        }
        if state.sel.active {
            self.depth = self.depth.saturating_sub(1);
        }
        Ok(())
    }

    pub fn cp_default(&mut self, state: &StdState, raw: &[u8]) -> Result<()> {
        if self.flags.contains(RcmFlags::CP_OUTPUT)
            && !(state.sel.active && self.flags.contains(RcmFlags::CP_REPLACE))
        {
            self.write(raw)?;
        }
        Ok(())
    }
}

/// Probe payload well-formedness with a strict pass.
fn is_well_formed(payload: &[u8]) -> bool {
    let mut tk = Tokenizer::new();
    tk.push_bytes(payload);
    loop {
        match tk.next_event(true) {
            Ok(Some(_)) => continue,
            Ok(None) => return tk.seen_root() && tk.depth() == 0,
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_probe() {
        assert!(is_well_formed(b"<a><b>x</b></a>"));
        assert!(!is_well_formed(b"<a><b>"));
        assert!(!is_well_formed(b"just text"));
    }

    #[test]
    fn try_write_honours_multi() {
        let mut rcm = Rcm::new("test");
        rcm.set_insert(b"<x/>".to_vec());
        assert!(rcm.flags.contains(RcmFlags::CP_WFXML));
        rcm.try_write().unwrap();
        assert!(rcm.insert_consumed());
        rcm.try_write().unwrap(); // second write suppressed

        let mut rcm = Rcm::new("test");
        rcm.flags |= RcmFlags::CP_MULTI;
        rcm.set_insert(b"<x/>".to_vec());
        rcm.try_write().unwrap();
        assert!(!rcm.insert_consumed()); // MULTI re-arms
    }

    #[test]
    fn selection_boundaries() {
        let mut rcm = Rcm::new("test");
        rcm.depth = 1;
        assert!(rcm.start_of_selection());
        assert!(!rcm.start_of_selection());
        assert!(rcm.end_of_selection());
        assert!(!rcm.end_of_selection());
    }
}
