// Copyright 2026 The Warden Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Semantic versions and version range predicates.
//!
//! Plugins declare their own version plus a version requirement for each of
//! their dependencies. A requirement string is a whitespace separated
//! conjunction of atoms like `>=1.2.0 <2.0.0`; a bare version means `=`,
//! and `*` matches anything.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// A version string could not be understood.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionParsingError(String);

impl VersionParsingError {
    fn new<S: Into<String>>(message: S) -> Self {
        VersionParsingError(message.into())
    }
}

impl fmt::Display for VersionParsingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "version parsing error: {}", self.0)
    }
}

impl Error for VersionParsingError {}

/// A `major.minor.patch` version with an optional pre-release tag.
///
/// Missing trailing components parse as zero, so `"1.2"` equals `"1.2.0"`.
/// A pre-release version orders below the same numeric tuple without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version { major, minor, patch, pre: None }
    }

    pub fn parse(s: &str) -> Result<Version, VersionParsingError> {
        let pattern = VersionPattern::parse(s)?;
        if pattern.wildcard {
            return Err(VersionParsingError::new(format!(
                "wildcard is not allowed in \"{}\"", s)));
        }
        Ok(pattern.base_version())
    }

    fn tuple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionParsingError;

    fn from_str(s: &str) -> Result<Version, VersionParsingError> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        self.tuple().cmp(&other.tuple()).then_with(|| {
            match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            }
        })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A version literal as written inside a requirement atom, where trailing
/// components may be elided or replaced by a wildcard (`*`, `x` or `X`).
#[derive(Debug, Clone, PartialEq)]
struct VersionPattern {
    nums: [u64; 3],
    /// How many numeric components were actually written.
    precision: usize,
    wildcard: bool,
    pre: Option<String>,
}

impl VersionPattern {
    fn parse(s: &str) -> Result<VersionPattern, VersionParsingError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParsingError::new("empty version string"));
        }
        let (num_part, pre) = match s.find('-') {
            Some(idx) => (&s[..idx], Some(s[idx + 1..].to_string())),
            None => (s, None),
        };
        if let Some(ref pre) = pre {
            if pre.is_empty() {
                return Err(VersionParsingError::new(format!(
                    "empty pre-release tag in \"{}\"", s)));
            }
        }

        let mut nums = [0u64; 3];
        let mut precision = 0;
        let mut wildcard = false;
        for (idx, seg) in num_part.split('.').enumerate() {
            if wildcard {
                return Err(VersionParsingError::new(format!(
                    "components after wildcard in \"{}\"", s)));
            }
            if idx >= 3 {
                return Err(VersionParsingError::new(format!(
                    "too many components in \"{}\"", s)));
            }
            match seg {
                "*" | "x" | "X" => wildcard = true,
                _ => {
                    nums[idx] = seg.parse::<u64>().map_err(|_| {
                        VersionParsingError::new(format!(
                            "invalid component \"{}\" in \"{}\"", seg, s))
                    })?;
                    precision = idx + 1;
                }
            }
        }
        if wildcard && pre.is_some() {
            return Err(VersionParsingError::new(format!(
                "pre-release tag on wildcard version \"{}\"", s)));
        }
        Ok(VersionPattern { nums, precision, wildcard, pre })
    }

    /// The pattern with unwritten components filled in as zero.
    fn base_version(&self) -> Version {
        Version {
            major: self.nums[0],
            minor: self.nums[1],
            patch: self.nums[2],
            pre: self.pre.clone(),
        }
    }

    /// Whether `version` matches this pattern exactly, up to the written
    /// precision when the pattern ends in a wildcard.
    fn matches_exact(&self, version: &Version) -> bool {
        if !self.wildcard {
            return *version == self.base_version();
        }
        let v = [version.major, version.minor, version.patch];
        self.nums[..self.precision] == v[..self.precision]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ReqOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Tilde,
    Caret,
}

/// One `<op><version>` atom of a requirement.
#[derive(Debug, Clone, PartialEq)]
struct Criterion {
    op: ReqOp,
    pattern: VersionPattern,
}

impl Criterion {
    fn parse(atom: &str) -> Result<Criterion, VersionParsingError> {
        let (op, rest) = if let Some(rest) = atom.strip_prefix(">=") {
            (ReqOp::Gte, rest)
        } else if let Some(rest) = atom.strip_prefix("<=") {
            (ReqOp::Lte, rest)
        } else if let Some(rest) = atom.strip_prefix('>') {
            (ReqOp::Gt, rest)
        } else if let Some(rest) = atom.strip_prefix('<') {
            (ReqOp::Lt, rest)
        } else if let Some(rest) = atom.strip_prefix('=') {
            (ReqOp::Eq, rest)
        } else if let Some(rest) = atom.strip_prefix('~') {
            (ReqOp::Tilde, rest)
        } else if let Some(rest) = atom.strip_prefix('^') {
            (ReqOp::Caret, rest)
        } else {
            (ReqOp::Eq, atom)
        };
        Ok(Criterion { op, pattern: VersionPattern::parse(rest)? })
    }

    fn matches(&self, version: &Version) -> bool {
        let base = self.pattern.base_version();
        match self.op {
            ReqOp::Eq => self.pattern.matches_exact(version),
            ReqOp::Gt => *version > base,
            ReqOp::Gte => *version >= base,
            ReqOp::Lt => *version < base,
            ReqOp::Lte => *version <= base,
            ReqOp::Tilde => *version >= base && *version < self.tilde_upper(),
            ReqOp::Caret => *version >= base && *version < self.caret_upper(),
        }
    }

    /// `~1.2.3` and `~1.2` allow patch changes only; `~1` allows minor
    /// changes too.
    fn tilde_upper(&self) -> Version {
        let [major, minor, _] = self.pattern.nums;
        if self.pattern.precision >= 2 {
            Version::new(major, minor + 1, 0)
        } else {
            Version::new(major + 1, 0, 0)
        }
    }

    /// `^` allows any change that keeps everything left of the leftmost
    /// non-zero component intact.
    fn caret_upper(&self) -> Version {
        let [major, minor, patch] = self.pattern.nums;
        if major > 0 {
            Version::new(major + 1, 0, 0)
        } else if minor > 0 {
            Version::new(0, minor + 1, 0)
        } else {
            Version::new(0, 0, patch + 1)
        }
    }
}

/// A conjunction of version criteria, e.g. `">=1.0.0 <2.0.0"`.
///
/// Satisfaction is a total boolean function; once a requirement has parsed
/// it can never fail. `~` and `^` follow the conventional semver meanings.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRequirement {
    text: String,
    criteria: Vec<Criterion>,
}

impl VersionRequirement {
    pub fn parse(s: &str) -> Result<VersionRequirement, VersionParsingError> {
        let mut criteria = Vec::new();
        for atom in s.split_whitespace() {
            criteria.push(Criterion::parse(atom)?);
        }
        Ok(VersionRequirement { text: s.trim().to_string(), criteria })
    }

    /// Matches any version at all, i.e. `*` or an empty requirement.
    pub fn accepts_any(&self) -> bool {
        self.criteria.iter().all(|c| {
            c.op == ReqOp::Eq && c.pattern.wildcard && c.pattern.precision == 0
        })
    }

    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        self.criteria.iter().all(|c| c.matches(version))
    }
}

impl FromStr for VersionRequirement {
    type Err = VersionParsingError;

    fn from_str(s: &str) -> Result<VersionRequirement, VersionParsingError> {
        VersionRequirement::parse(s)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
