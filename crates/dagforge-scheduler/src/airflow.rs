//! Airflow as the execution scheduler.
//!
//! Airflow picks DAG files up from the project's `dags/` directory. Bootstrap
//! only has to make sure the shared helper module is there.

use async_trait::async_trait;
use bytes::Bytes;
use dagforge_core::Result;
use dagforge_core::project::ProjectSpec;
use dagforge_core::scheduler::SchedulerUnit;
use dagforge_deployer::StoreFactory;
use std::sync::Arc;
use tracing::debug;

use crate::resources::{AIRFLOW_DAG_TEMPLATE, AIRFLOW_LIB};

pub const AIRFLOW_JOBS_DIR: &str = "dags";
pub const AIRFLOW_JOBS_EXTENSION: &str = ".py";

/// Reserved name of the shared module inside the jobs dir.
pub const AIRFLOW_LIB_FILE: &str = "__lib.py";

pub struct AirflowScheduler {
    stores: Arc<dyn StoreFactory>,
}

impl AirflowScheduler {
    pub fn new(stores: Arc<dyn StoreFactory>) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl SchedulerUnit for AirflowScheduler {
    fn name(&self) -> &'static str {
        "airflow"
    }

    fn jobs_dir(&self) -> &str {
        AIRFLOW_JOBS_DIR
    }

    fn jobs_extension(&self) -> &str {
        AIRFLOW_JOBS_EXTENSION
    }

    fn template_path(&self) -> &str {
        AIRFLOW_DAG_TEMPLATE
    }

    async fn bootstrap(&self, project: &ProjectSpec) -> Result<()> {
        let store = self.stores.for_project(project)?;
        let path = format!("{}/{}", AIRFLOW_JOBS_DIR, AIRFLOW_LIB_FILE);
        store.write(&path, Bytes::from_static(AIRFLOW_LIB.as_bytes())).await?;
        debug!(project = %project.name, path = %path, "airflow helper module written");
        Ok(())
    }
}
