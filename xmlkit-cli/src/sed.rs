//! `xmlkit sed`: apply `s/regex/replacement/[gi]` scripts to leaf
//! string values and re-emit the document.

use std::io::Write;

use regex::{Captures, Regex, RegexBuilder};

use xmlkit_core::echo::Echo;
use xmlkit_core::filelist::{FileList, FileListFlags};
use xmlkit_core::leafparse::{LeafFlags, LeafReader};
use xmlkit_core::signal;
use xmlkit_core::unecho::{Unecho, UnechoFlags};
use xmlkit_core::{Wrap, XmlkitError};

pub struct Subst {
    re: Regex,
    replacement: String,
    global: bool,
}

impl Subst {
    /// Parse one `s/regex/replacement/flags` script. The delimiter is
    /// whatever follows the `s`, sed-style.
    pub fn parse(script: &str) -> xmlkit_core::Result<Subst> {
        let bytes = script.as_bytes();
        if bytes.first() != Some(&b's') || bytes.len() < 2 {
            return Err(XmlkitError::SedScript(script.to_string()));
        }
        let delim = bytes[1] as char;
        let mut parts = Vec::new();
        let mut cur = String::new();
        let mut chars = script[2..].chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(d) if d == delim => cur.push(d),
                    Some(d) => {
                        cur.push('\\');
                        cur.push(d);
                    }
                    None => cur.push('\\'),
                }
            } else if c == delim {
                parts.push(std::mem::take(&mut cur));
            } else {
                cur.push(c);
            }
        }
        parts.push(cur);
        if parts.len() != 3 {
            return Err(XmlkitError::SedScript(script.to_string()));
        }
        let flags = &parts[2];
        let re = RegexBuilder::new(&parts[0])
            .case_insensitive(flags.contains('i'))
            .build()?;
        Ok(Subst {
            re,
            replacement: parts[1].clone(),
            global: flags.contains('g'),
        })
    }

    /// Substitute with sed-style interpolation: `&` is the whole match,
    /// `\1`..`\9` are capture groups.
    pub fn apply(&self, value: &str) -> String {
        let rep = |caps: &Captures| -> String {
            let mut out = String::new();
            let mut chars = self.replacement.chars();
            while let Some(c) = chars.next() {
                match c {
                    '&' => out.push_str(caps.get(0).map(|m| m.as_str()).unwrap_or("")),
                    '\\' => match chars.next() {
                        Some(d @ '1'..='9') => {
                            let n = d as usize - '0' as usize;
                            out.push_str(caps.get(n).map(|m| m.as_str()).unwrap_or(""));
                        }
                        Some(d) => out.push(d),
                        None => out.push('\\'),
                    },
                    other => out.push(other),
                }
            }
            out
        };
        if self.global {
            self.re.replace_all(value, rep).into_owned()
        } else {
            self.re.replace(value, rep).into_owned()
        }
    }
}

pub fn run(scripts: &[String], args: &[String]) -> xmlkit_core::Result<i32> {
    let substs = scripts
        .iter()
        .map(|s| Subst::parse(s))
        .collect::<xmlkit_core::Result<Vec<_>>>()?;

    let fl = FileList::parse(args, FileListFlags::MIN1);
    let wrap = Wrap::default();
    let mut out = std::io::stdout().lock();

    for (file, xpaths) in fl.entries() {
        if signal::quit_requested() {
            break;
        }
        let mut echo = Echo::new(0);
        let mut unecho = Unecho::new(UnechoFlags::empty());
        let reader = LeafReader::open(
            file,
            xpaths,
            LeafFlags::PRE_OPEN | LeafFlags::PRE_CLOSE | LeafFlags::ALWAYS_CHARDATA,
        )?;
        for leaf in reader {
            let leaf = leaf?;
            let value = if leaf.selected {
                substs.iter().fold(leaf.value.clone(), |v, s| s.apply(&v))
            } else {
                leaf.value.clone()
            };
            let line = unecho.format_leaf(&leaf.path, &value);
            echo.puts(&line)?;
        }
        echo.close()?;
        let body = echo.into_output();
        if !body.is_empty() {
            out.write_all(wrap.headwrap().as_bytes())?;
            out.write_all(&body)?;
            out.write_all(wrap.footwrap().as_bytes())?;
        }
    }
    out.flush()?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_apply() {
        let s = Subst::parse("s/foo/bar/g").unwrap();
        assert_eq!(s.apply("foo foo"), "bar bar");

        let s = Subst::parse("s/foo/bar/").unwrap();
        assert_eq!(s.apply("foo foo"), "bar foo");
    }

    #[test]
    fn alternate_delimiters_and_escapes() {
        let s = Subst::parse("s|a/b|c|").unwrap();
        assert_eq!(s.apply("a/b"), "c");

        let s = Subst::parse("s/a\\/b/c/").unwrap();
        assert_eq!(s.apply("a/b"), "c");
    }

    #[test]
    fn interpolation() {
        let s = Subst::parse("s/(f)oo/\\1xx &/").unwrap();
        assert_eq!(s.apply("foo"), "fxx foo");
    }

    #[test]
    fn case_insensitive_flag() {
        let s = Subst::parse("s/foo/bar/i").unwrap();
        assert_eq!(s.apply("FOO"), "bar");
    }

    #[test]
    fn rejects_malformed_scripts() {
        assert!(Subst::parse("x/foo/bar/").is_err());
        assert!(Subst::parse("s/foo").is_err());
    }
}
