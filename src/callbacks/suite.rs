//! Built-in schema objects created along the 4.1 → 5.7 chain.
//!
//! Each entry creates (or rewrites) a table using a storage feature that
//! first appeared in its version, so later upgrades have to carry it.

use super::{CallbackRegistry, LifecycleEvent, VerificationAction};
use crate::core::{Version, VersionChain};

struct SuiteEntry {
    version: &'static str,
    event: LifecycleEvent,
    description: &'static str,
    sql: &'static str,
}

const SUITE: &[SuiteEntry] = &[
    SuiteEntry {
        version: "4.1.21",
        event: LifecycleEvent::PostUpgrade,
        description: "Creating MyISAM table on 4.1",
        sql: "CREATE TABLE t_41_myisam1 (
id int auto_increment, name VARCHAR(255),
poi GEOMETRY NOT NULL,
info TEXT,
FULLTEXT KEY(info),
SPATIAL KEY(poi),
PRIMARY KEY (id)) ENGINE=MyISAM",
    },
    SuiteEntry {
        version: "4.1.21",
        event: LifecycleEvent::PostUpgrade,
        description: "Creating t_41_ib1 with InnoDB on 4.1",
        sql: "CREATE TABLE t_41_ib1 (
id int auto_increment, name VARCHAR(255),
PRIMARY KEY (id)) ENGINE=InnoDB",
    },
    SuiteEntry {
        version: "5.1.73",
        event: LifecycleEvent::PostUpgrade,
        description: "Creating t_51_par1 with partitioning on 5.1",
        sql: "CREATE TABLE t_51_par1 (
id int auto_increment, name TEXT,
PRIMARY KEY (id)) ENGINE=InnoDB PARTITION BY KEY(id) PARTITIONS 5",
    },
    SuiteEntry {
        version: "5.5.45",
        event: LifecycleEvent::PostUpgrade,
        description: "Upgrading t_51_par1 with partitioning on 5.5",
        sql: "ALTER TABLE `test`.`t_51_par1`
PARTITION BY KEY /*!50531 ALGORITHM = 1 */ (id) PARTITIONS 5",
    },
    SuiteEntry {
        version: "5.5.45",
        event: LifecycleEvent::PostUpgrade,
        description: "Creating t_55_cmp1 with compression on 5.5",
        sql: "SET GLOBAL innodb_file_format=Barracuda;
SET GLOBAL innodb_file_per_table=1;
CREATE TABLE t_55_cmp1 (
id int auto_increment, name TEXT,
PRIMARY KEY (id)) ENGINE=InnoDB ROW_FORMAT=COMPRESSED",
    },
    SuiteEntry {
        version: "5.6.25",
        event: LifecycleEvent::PostUpgrade,
        description: "Creating t_56_ft1 with fulltext index on 5.6",
        sql: "CREATE TABLE t_56_ft1 (
id int auto_increment, name TEXT,
FULLTEXT KEY `ft_name` (name),
PRIMARY KEY (id))",
    },
    SuiteEntry {
        version: "5.7.9",
        event: LifecycleEvent::PostUpgrade,
        description: "Creating t_57_rt1 with spatial index on 5.7",
        sql: "CREATE TABLE t_57_rt1 (
id int auto_increment, poi GEOMETRY NOT NULL,
SPATIAL KEY `rt_poi` (poi),
PRIMARY KEY (id))",
    },
];

/// Every built-in action with its registration key, in registration order.
pub fn builtin_actions() -> Vec<(Version, LifecycleEvent, VerificationAction)> {
    SUITE
        .iter()
        .filter_map(|entry| {
            let version = entry.version.parse().ok()?;
            Some((
                version,
                entry.event,
                VerificationAction::sql(entry.description, entry.sql),
            ))
        })
        .collect()
}

/// Register the built-in actions whose version is part of `chain`.
///
/// Returns the number of actions registered.
pub fn register_builtin_suite(registry: &mut CallbackRegistry, chain: &VersionChain) -> usize {
    let mut registered = 0;
    for (version, event, action) in builtin_actions() {
        if chain.contains(&version) {
            registry.register(version, event, action);
            registered += 1;
        }
    }
    registered
}
