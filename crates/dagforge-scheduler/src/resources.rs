//! Scheduler templates and support files compiled into the binary.

/// Resource path of the Airflow job template.
pub const AIRFLOW_DAG_TEMPLATE: &str = "airflow/base_dag.py.tmpl";

/// Shared library every compiled Airflow DAG imports.
pub const AIRFLOW_LIB: &str = include_str!("../templates/airflow/__lib.py");

const RESOURCES: &[(&str, &str)] = &[(
    AIRFLOW_DAG_TEMPLATE,
    include_str!("../templates/airflow/base_dag.py.tmpl"),
)];

/// Look up an embedded template by resource path.
pub fn template(path: &str) -> Option<&'static str> {
    RESOURCES
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, source)| *source)
}
