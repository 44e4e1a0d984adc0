use ns_lib::{INode, NsResult};

/// Scoped backend transaction. Rolled back on drop unless committed.
pub struct TransactionGuard<'a> {
    inode: &'a dyn INode,
    committed: bool,
}

impl<'a> TransactionGuard<'a> {
    pub fn begin(inode: &'a dyn INode) -> NsResult<Self> {
        inode.begin()?;
        Ok(Self {
            inode,
            committed: false,
        })
    }

    pub fn commit(mut self) -> NsResult<()> {
        self.inode.commit()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        warn!("rolling back uncommitted transaction");
        if let Err(e) = self.inode.rollback() {
            warn!("rollback failed: {}", e);
        }
    }
}
