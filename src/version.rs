//! Debian version numbers and dependency relations, per deb-version(5)
//! and deb-control(5).

use crate::error::AeptError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// An `[epoch:]upstream[-revision]` version. The raw string is kept so
/// the on-disk and on-wire forms round-trip exactly.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    raw: String,
    epoch: u64,
    upstream: String,
    revision: String,
}

impl Version {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl FromStr for Version {
    type Err = AeptError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AeptError::InvalidVersion("empty", raw.into()));
        }
        let (epoch, rest) = match raw.split_once(':') {
            Some((e, rest)) => {
                let epoch = e
                    .parse::<u64>()
                    .map_err(|_| AeptError::InvalidVersion("bad epoch", raw.into()))?;
                (epoch, rest)
            }
            None => (0, raw),
        };
        // dpkg splits at the *last* hyphen
        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((u, r)) => (u, r),
            None => (rest, ""),
        };
        if upstream.is_empty() {
            return Err(AeptError::InvalidVersion("empty upstream version", raw.into()));
        }
        let ok = |s: &str| {
            s.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | ':' | '~')
            })
        };
        if !ok(upstream) || !ok(revision) {
            return Err(AeptError::InvalidVersion("forbidden character", raw.into()));
        }
        Ok(Self {
            raw: raw.to_string(),
            epoch,
            upstream: upstream.to_string(),
            revision: revision.to_string(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| cmp_fragment(&self.upstream, &other.upstream))
            .then_with(|| cmp_fragment(&self.revision, &other.revision))
    }
}

/// Sort weight of one character. `~` sorts before the empty string,
/// letters before everything else, the rest by ASCII shifted past 'z'.
fn char_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

/// The dpkg two-cursor walk: alternate a non-digit run compared
/// char-by-char with `char_order`, then a digit run compared numerically.
fn cmp_fragment(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        while i < a.len() && !a[i].is_ascii_digit() || j < b.len() && !b[j].is_ascii_digit() {
            let ca = a.get(i).filter(|c| !c.is_ascii_digit()).copied();
            let cb = b.get(j).filter(|c| !c.is_ascii_digit()).copied();
            match char_order(ca).cmp(&char_order(cb)) {
                Ordering::Equal => {}
                diff => return diff,
            }
            if ca.is_none() && cb.is_none() {
                break;
            }
            if ca.is_some() {
                i += 1;
            }
            if cb.is_some() {
                j += 1;
            }
        }
        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }
        let da = &a[i..a.len().min(i + a[i..].iter().take_while(|c| c.is_ascii_digit()).count())];
        let db = &b[j..b.len().min(j + b[j..].iter().take_while(|c| c.is_ascii_digit()).count())];
        match da.len().cmp(&db.len()).then_with(|| da.cmp(db)) {
            Ordering::Equal => {}
            diff => return diff,
        }
        i += da.len();
        j += db.len();
    }
    Ordering::Equal
}

/// Relational operator of a versioned dependency. `<` and `>` parse as
/// their historical `<=`/`>=` meanings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Earlier,
    EarlierEqual,
    Equal,
    LaterEqual,
    Later,
}

impl Relation {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "<<" => Self::Earlier,
            "<=" | "<" => Self::EarlierEqual,
            "=" | "==" => Self::Equal,
            ">=" | ">" => Self::LaterEqual,
            ">>" => Self::Later,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Earlier => "<<",
            Self::EarlierEqual => "<=",
            Self::Equal => "=",
            Self::LaterEqual => ">=",
            Self::Later => ">>",
        }
    }

    pub fn satisfied_by(self, candidate: &Version, wanted: &Version) -> bool {
        let ord = candidate.cmp(wanted);
        match self {
            Self::Earlier => ord == Ordering::Less,
            Self::EarlierEqual => ord != Ordering::Greater,
            Self::Equal => ord == Ordering::Equal,
            Self::LaterEqual => ord != Ordering::Less,
            Self::Later => ord == Ordering::Greater,
        }
    }
}

/// One alternative inside a dependency: a name with an optional version
/// constraint. Architecture qualifiers (`name:any`) are tolerated and
/// stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Possibility {
    pub name: String,
    pub constraint: Option<(Relation, Version)>,
}

impl Possibility {
    /// Whether a package `name`/`version` pair satisfies this possibility.
    /// A providing package with no published version satisfies only
    /// unversioned constraints, same as dpkg's virtual packages.
    pub fn satisfied_by(&self, name: &str, version: Option<&Version>) -> bool {
        if self.name != name {
            return false;
        }
        match (&self.constraint, version) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((rel, wanted)), Some(have)) => rel.satisfied_by(have, wanted),
        }
    }
}

impl fmt::Display for Possibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some((rel, ver)) => write!(f, "{} ({} {})", self.name, rel.as_str(), ver),
            None => f.write_str(&self.name),
        }
    }
}

/// One comma-separated element of a dependency field: alternatives
/// separated by `|`, any of which satisfies the dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub alternatives: Vec<Possibility>,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alts: Vec<String> = self.alternatives.iter().map(ToString::to_string).collect();
        f.write_str(&alts.join(" | "))
    }
}

fn parse_possibility(s: &str) -> Result<Possibility, AeptError> {
    let s = s.trim();
    let (name, rest) = match s.find(['(', ' ', '\t']) {
        Some(at) => (&s[..at], s[at..].trim()),
        None => (s, ""),
    };
    let name = name.split(':').next().unwrap_or(name); // strip :any / :native
    if name.is_empty() {
        return Err(AeptError::MalformedControl(format!("empty name in relation '{s}'")));
    }
    let constraint = if rest.is_empty() {
        None
    } else {
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| AeptError::MalformedControl(format!("unparseable relation '{s}'")))?
            .trim();
        let op_len = inner.bytes().take_while(|b| matches!(b, b'<' | b'>' | b'=')).count();
        let rel = Relation::parse(&inner[..op_len])
            .ok_or_else(|| AeptError::MalformedControl(format!("bad operator in '{s}'")))?;
        let ver: Version = inner[op_len..].trim().parse()?;
        Some((rel, ver))
    };
    Ok(Possibility { name: name.to_string(), constraint })
}

/// Parse a full dependency field value (`a, b (>= 1.0) | c`).
/// An empty field yields an empty list.
pub fn parse_dependency_list(field: &str) -> Result<Vec<Dependency>, AeptError> {
    let mut out = Vec::new();
    for chunk in field.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let alternatives = chunk
            .split('|')
            .map(parse_possibility)
            .collect::<Result<Vec<_>, _>>()?;
        out.push(Dependency { alternatives });
    }
    Ok(out)
}
