use crate::{Acl, AclKind, SecurityContext, Stat};

/// Decides whether `ctx` may access an entry with the requested `mode`.
///
/// `mode` is expressed in owner bits (`S_IREAD`, `S_IWRITE`, `S_IEXEC`, or a
/// combination of them). Returns true when access is granted.
pub fn check_permissions(ctx: &SecurityContext, acl: &Acl, stat: &Stat, mode: u32) -> bool {
    if ctx.is_root() {
        return true;
    }
    if ctx.user.banned {
        return false;
    }

    let wanted = (mode >> 6) & 0o7;

    if ctx.uid() == stat.uid {
        return (stat.mode >> 6) & wanted == wanted;
    }

    if acl.is_empty() {
        let granted = if ctx.has_group(stat.gid) {
            (stat.mode >> 3) & 0o7
        } else {
            stat.mode & 0o7
        };
        return granted & wanted == wanted;
    }

    let mask = acl
        .get(AclKind::Mask, false)
        .map(|e| e.perm as u32)
        .unwrap_or(0o7);

    if let Some(user) = acl
        .iter()
        .find(|e| !e.is_default && e.kind == AclKind::User && e.id == ctx.uid())
    {
        return (user.perm as u32) & mask & wanted == wanted;
    }

    let mut matched = false;
    let mut granted = 0u32;
    for e in acl.iter().filter(|e| !e.is_default) {
        let member = match e.kind {
            AclKind::GroupObj => ctx.has_group(stat.gid),
            AclKind::Group => ctx.has_group(e.id),
            _ => false,
        };
        if member {
            matched = true;
            granted |= e.perm as u32;
        }
    }
    if matched {
        return granted & mask & wanted == wanted;
    }

    acl.get(AclKind::Other, false)
        .map(|e| (e.perm as u32) & wanted == wanted)
        .unwrap_or(false)
}
