use crate::{s_isdir, NsError, NsResult, S_IFMT, S_ISGID, S_ISUID, S_ISVTX};
use std::fmt;
use std::str::FromStr;

/// Entry kinds, declared in canonical ACL order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AclKind {
    UserObj,
    User,
    GroupObj,
    Group,
    Mask,
    Other,
}

impl AclKind {
    fn as_char(&self) -> char {
        match self {
            AclKind::UserObj => 'A',
            AclKind::User => 'B',
            AclKind::GroupObj => 'C',
            AclKind::Group => 'D',
            AclKind::Mask => 'E',
            AclKind::Other => 'F',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(AclKind::UserObj),
            'B' => Some(AclKind::User),
            'C' => Some(AclKind::GroupObj),
            'D' => Some(AclKind::Group),
            'E' => Some(AclKind::Mask),
            'F' => Some(AclKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AclEntry {
    pub kind: AclKind,
    /// Default entries live on directories and are inherited by children.
    pub is_default: bool,
    pub id: u32,
    pub perm: u8,
}

impl AclEntry {
    pub fn new(kind: AclKind, id: u32, perm: u8) -> Self {
        Self {
            kind,
            is_default: false,
            id,
            perm,
        }
    }

    pub fn new_default(kind: AclKind, id: u32, perm: u8) -> Self {
        Self {
            kind,
            is_default: true,
            id,
            perm,
        }
    }

    fn sort_key(&self) -> (bool, AclKind, u32) {
        (self.is_default, self.kind, self.id)
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = if self.is_default {
            self.kind.as_char().to_ascii_lowercase()
        } else {
            self.kind.as_char()
        };
        write!(f, "{}{}{}", c, self.perm, self.id)
    }
}

impl FromStr for AclEntry {
    type Err = NsError;

    fn from_str(s: &str) -> NsResult<Self> {
        let invalid = || NsError::InvalidValue(format!("invalid acl entry '{}'", s));
        let mut chars = s.chars();
        let type_char = chars.next().ok_or_else(invalid)?;
        let kind = AclKind::from_char(type_char.to_ascii_uppercase()).ok_or_else(invalid)?;
        let perm = chars
            .next()
            .and_then(|c| c.to_digit(8))
            .ok_or_else(invalid)? as u8;
        let id = chars.as_str().parse::<u32>().map_err(|_| invalid())?;
        Ok(AclEntry {
            kind,
            is_default: type_char.is_ascii_lowercase(),
            id,
            perm,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<AclEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, entry: AclEntry) {
        self.entries.push(entry);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AclEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AclEntry> {
        self.entries.iter_mut()
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Index of the first entry of the given kind and flavor.
    pub fn has(&self, kind: AclKind, is_default: bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.kind == kind && e.is_default == is_default)
    }

    pub fn get(&self, kind: AclKind, is_default: bool) -> Option<&AclEntry> {
        self.has(kind, is_default).map(|i| &self.entries[i])
    }

    pub fn has_defaults(&self) -> bool {
        self.entries.iter().any(|e| e.is_default)
    }

    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.sort_key());
    }

    /// Checks structural well-formedness of both the access and the
    /// default section. An empty ACL is valid.
    pub fn validate(&self) -> NsResult<()> {
        for is_default in [false, true] {
            let section: Vec<&AclEntry> = self
                .entries
                .iter()
                .filter(|e| e.is_default == is_default)
                .collect();
            if section.is_empty() {
                continue;
            }
            let flavor = if is_default { "default" } else { "access" };

            let count = |kind: AclKind| section.iter().filter(|e| e.kind == kind).count();
            for kind in [AclKind::UserObj, AclKind::GroupObj, AclKind::Other] {
                if count(kind) != 1 {
                    return Err(NsError::InvalidValue(format!(
                        "{} acl must have exactly one {:?} entry",
                        flavor, kind
                    )));
                }
            }
            let masks = count(AclKind::Mask);
            if masks > 1 {
                return Err(NsError::InvalidValue(format!(
                    "{} acl has more than one mask",
                    flavor
                )));
            }
            let named = count(AclKind::User) + count(AclKind::Group);
            if named > 0 && masks == 0 {
                return Err(NsError::InvalidValue(format!(
                    "{} acl has named entries but no mask",
                    flavor
                )));
            }

            for kind in [AclKind::User, AclKind::Group] {
                let mut ids: Vec<u32> = section
                    .iter()
                    .filter(|e| e.kind == kind)
                    .map(|e| e.id)
                    .collect();
                let before = ids.len();
                ids.sort_unstable();
                ids.dedup();
                if ids.len() != before {
                    return Err(NsError::InvalidValue(format!(
                        "{} acl has duplicated {:?} entries",
                        flavor, kind
                    )));
                }
            }

            if let Some(e) = section.iter().find(|e| e.perm > 7) {
                return Err(NsError::InvalidValue(format!(
                    "invalid permission bits in acl entry {}",
                    e
                )));
            }
        }
        Ok(())
    }

    /// Builds the ACL of a child created under a directory holding `parent`.
    ///
    /// `create_mode` is the mode requested by the caller and `file_mode` the
    /// mode of the new entry; the permission bits of the latter are
    /// recomputed from the inherited entries. Directories keep the default
    /// entries so inheritance continues further down.
    pub fn inherit(
        parent: &Acl,
        uid: u32,
        gid: u32,
        create_mode: u32,
        file_mode: &mut u32,
    ) -> Acl {
        let has_mask = parent.has(AclKind::Mask, true).is_some();
        let is_dir = s_isdir(*file_mode);
        *file_mode &= S_IFMT | S_ISUID | S_ISGID | S_ISVTX;

        let owner_bits = ((create_mode >> 6) & 0o7) as u8;
        let group_bits = ((create_mode >> 3) & 0o7) as u8;
        let other_bits = (create_mode & 0o7) as u8;

        let mut out = Acl::new();
        for def in parent.entries.iter().filter(|e| e.is_default) {
            let mut ace = AclEntry {
                is_default: false,
                ..*def
            };
            match ace.kind {
                AclKind::UserObj => {
                    ace.id = uid;
                    ace.perm &= owner_bits;
                    *file_mode |= (ace.perm as u32) << 6;
                }
                AclKind::GroupObj => {
                    ace.id = gid;
                    ace.perm &= group_bits;
                    if !has_mask {
                        *file_mode |= (ace.perm as u32) << 3;
                    }
                }
                AclKind::Mask => {
                    ace.perm &= group_bits;
                    *file_mode |= (ace.perm as u32) << 3;
                }
                AclKind::Other => {
                    ace.perm &= other_bits;
                    *file_mode |= ace.perm as u32;
                }
                AclKind::User | AclKind::Group => {}
            }
            out.push(ace);
            if is_dir {
                out.push(*def);
            }
        }
        out.sort();
        out
    }
}

impl std::ops::Index<usize> for Acl {
    type Output = AclEntry;

    fn index(&self, index: usize) -> &AclEntry {
        &self.entries[index]
    }
}

impl<'a> IntoIterator for &'a Acl {
    type Item = &'a AclEntry;
    type IntoIter = std::slice::Iter<'a, AclEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.entries.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for Acl {
    type Err = NsError;

    fn from_str(s: &str) -> NsResult<Self> {
        let entries = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(AclEntry::from_str)
            .collect::<NsResult<Vec<_>>>()?;
        Ok(Acl { entries })
    }
}
