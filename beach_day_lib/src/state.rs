use std::{sync::Arc, time::Duration};

use crate::{
    beach_day::BeachDay, beach_day_file::BeachDayFile, beaches::BeachCatalog,
    scripts::ScriptRunner,
};

pub struct AppState {
    pub beach_day: BeachDay,
    pub beaches: BeachCatalog,
    pub scripts: ScriptRunner,
}

impl AppState {
    pub async fn new(beach_day_file: BeachDayFile) -> anyhow::Result<Arc<Self>> {
        let beaches = BeachCatalog::load(beach_day_file.beach_data.as_deref())?;
        let scripts = ScriptRunner::new(beach_day_file.scripts.clone())
            .with_timeout(Duration::from_secs(beach_day_file.script_timeout_secs));
        let beach_day = BeachDay::new(beach_day_file).await?;
        Ok(Self::from_parts(beach_day, beaches, scripts))
    }

    pub fn from_parts(beach_day: BeachDay, beaches: BeachCatalog, scripts: ScriptRunner) -> Arc<Self> {
        Arc::new(Self {
            beach_day,
            beaches,
            scripts,
        })
    }
}
