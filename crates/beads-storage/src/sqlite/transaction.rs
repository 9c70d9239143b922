//! Transaction wrapper for [`SqliteStore`].

use rusqlite::Connection;

use beads_core::dependency::Dependency;
use beads_core::issue::Issue;

use crate::error::Result;
use crate::sqlite::config;
use crate::sqlite::dependencies;
use crate::sqlite::issues;
use crate::sqlite::labels;
use crate::sqlite::store::{SqliteStore, begin_immediate, commit};
use crate::traits::Transaction;

/// A connection that is inside an open transaction. Delegates to the same
/// connection-level helpers used by [`SqliteStore`].
pub(crate) struct SqliteTx<'a> {
    pub(crate) conn: &'a Connection,
}

impl Transaction for SqliteTx<'_> {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        issues::insert_issue(self.conn, issue, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        issues::get_issue_on_conn(self.conn, id)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        issues::close_issue_on_conn(self.conn, id, reason, actor)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<bool> {
        dependencies::insert_dependency(self.conn, dep, actor)
    }

    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        dependencies::get_dependency_records_on_conn(self.conn, issue_id)
    }

    fn add_label(&self, issue_id: &str, label: &str) -> Result<()> {
        labels::add_label_on_conn(self.conn, issue_id, label)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        config::set_config_on_conn(self.conn, key, value)
    }

    fn get_config(&self, key: &str) -> Result<String> {
        config::get_config_on_conn(self.conn, key)
    }
}

impl SqliteStore {
    /// Runs a closure inside a database transaction. The transaction is
    /// rolled back when the closure fails.
    pub fn run_in_transaction_impl(
        &self,
        f: &dyn Fn(&dyn Transaction) -> Result<()>,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = begin_immediate(&conn)?;
        f(&SqliteTx { conn: &tx })?;
        commit(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use beads_core::enums::DependencyType;
    use beads_core::issue::IssueBuilder;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn transaction_commit() {
        let store = test_store();

        store
            .run_in_transaction_impl(&|tx| {
                let issue = IssueBuilder::new("In transaction").id("bd-tx1").build();
                tx.create_issue(&issue, "alice")?;
                tx.add_label("bd-tx1", "transacted")?;
                Ok(())
            })
            .unwrap();

        let issue = store.get_issue_impl("bd-tx1").unwrap();
        assert_eq!(issue.title, "In transaction");
        assert_eq!(issue.labels, vec!["transacted"]);
    }

    #[test]
    fn transaction_rollback_on_error() {
        let store = test_store();

        let result = store.run_in_transaction_impl(&|tx| {
            let issue = IssueBuilder::new("Should rollback").id("bd-tx2").build();
            tx.create_issue(&issue, "alice")?;
            Err(StorageError::Internal("test rollback".into()))
        });

        assert!(result.is_err());
        assert!(store.get_issue_impl("bd-tx2").unwrap_err().is_not_found());
    }

    #[test]
    fn transaction_sees_its_own_edges() {
        let store = test_store();

        store
            .run_in_transaction_impl(&|tx| {
                tx.create_issue(&IssueBuilder::new("Parent").id("bd-p").build(), "alice")?;
                tx.create_issue(&IssueBuilder::new("Child").id("bd-c").build(), "alice")?;
                let dep = Dependency::new("bd-c", "bd-p", DependencyType::ParentChild);
                assert!(tx.add_dependency(&dep, "alice")?);
                assert!(!tx.add_dependency(&dep, "alice")?);
                assert_eq!(tx.get_dependency_records("bd-c")?.len(), 1);
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get_dependency_records_impl("bd-c").unwrap().len(), 1);
    }
}
