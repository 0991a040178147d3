//! Process-wide registry of worker pools, one per execution environment.

use std::sync::Arc;

use expanse_config::ProcMacroConfig;
use parking_lot::Mutex;

use crate::environment::{ExecutionEnvironment, HelperCommand};
use crate::pool::ProcMacroServerPool;

/// Why no pool could be handed out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolUnavailable {
    /// Procedural macros or build-script evaluation are switched off.
    #[error("procedural macro expansion is disabled")]
    Disabled,
    /// No remote environment is configured.
    #[error("no {0} execution environment is configured")]
    NoEnvironment(ExecutionEnvironment),
    /// The helper executable could not be located.
    #[error("helper executable not found: {0}")]
    ExecutableNotFound(String),
}

/// Owns the lazily created worker pools.
///
/// Pools live as long as the service; [`dispose`](Self::dispose) stops all
/// worker processes.
pub struct ProcMacroApplicationService {
    config: ProcMacroConfig,
    local: Mutex<Option<Arc<ProcMacroServerPool>>>,
    remote: Mutex<Option<Arc<ProcMacroServerPool>>>,
}

impl ProcMacroApplicationService {
    /// Creates the service. No pool or process is created yet.
    pub fn new(config: ProcMacroConfig) -> Self {
        Self {
            config,
            local: Mutex::new(None),
            remote: Mutex::new(None),
        }
    }

    /// Returns `true` if procedural macros may be expanded at all.
    pub fn is_enabled(&self) -> bool {
        self.config.is_active()
    }

    /// The configuration the service was created with.
    pub fn config(&self) -> &ProcMacroConfig {
        &self.config
    }

    /// Returns the shared pool for `environment`, creating it on first use.
    ///
    /// Returns `None` if the feature is disabled or the helper is missing.
    pub fn get_or_create_pool(
        &self,
        environment: ExecutionEnvironment,
    ) -> Option<Arc<ProcMacroServerPool>> {
        self.pool(environment).ok()
    }

    /// Like [`get_or_create_pool`](Self::get_or_create_pool), but says why
    /// no pool is available.
    pub fn pool(
        &self,
        environment: ExecutionEnvironment,
    ) -> Result<Arc<ProcMacroServerPool>, PoolUnavailable> {
        if !self.is_enabled() {
            return Err(PoolUnavailable::Disabled);
        }

        let slot = match environment {
            ExecutionEnvironment::Local => &self.local,
            ExecutionEnvironment::Remote => &self.remote,
        };
        let mut slot = slot.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }

        let command = self.helper_command(environment)?;
        let program = command.program.display().to_string();
        let pool = ProcMacroServerPool::try_create(
            environment,
            command,
            self.config.timeout.as_duration(),
            self.config.workers,
        )
        .map(Arc::new)
        .ok_or(PoolUnavailable::ExecutableNotFound(program))?;
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// Stops every worker of every pool and forgets the pools.
    pub fn dispose(&self) {
        for slot in [&self.local, &self.remote] {
            if let Some(pool) = slot.lock().take() {
                pool.shutdown();
            }
        }
    }

    fn helper_command(
        &self,
        environment: ExecutionEnvironment,
    ) -> Result<HelperCommand, PoolUnavailable> {
        let program = self.config.helper.clone().ok_or_else(|| {
            PoolUnavailable::ExecutableNotFound("no helper is configured".to_string())
        })?;
        let args = self.config.helper_args.clone();
        match environment {
            ExecutionEnvironment::Local => Ok(HelperCommand::local(program, args)),
            ExecutionEnvironment::Remote => {
                let remote = self
                    .config
                    .remote
                    .as_ref()
                    .ok_or(PoolUnavailable::NoEnvironment(environment))?;
                Ok(HelperCommand::remote(
                    remote.launcher.clone(),
                    program,
                    args,
                ))
            }
        }
    }
}

impl Drop for ProcMacroApplicationService {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expanse_config::RemoteConfig;
    use std::path::PathBuf;

    fn config_with_helper(helper: PathBuf) -> ProcMacroConfig {
        ProcMacroConfig {
            helper: Some(helper),
            ..ProcMacroConfig::default()
        }
    }

    fn existing_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper");
        std::fs::write(&path, b"").unwrap();
        (dir, path)
    }

    #[test]
    fn disabled_feature_yields_none() {
        let (_dir, helper) = existing_file();
        let mut config = config_with_helper(helper);
        config.enabled = false;
        let service = ProcMacroApplicationService::new(config);
        assert!(!service.is_enabled());
        assert_eq!(
            service.pool(ExecutionEnvironment::Local).err(),
            Some(PoolUnavailable::Disabled)
        );
    }

    #[test]
    fn build_scripts_are_a_prerequisite() {
        let (_dir, helper) = existing_file();
        let mut config = config_with_helper(helper);
        config.evaluate_build_scripts = false;
        let service = ProcMacroApplicationService::new(config);
        assert!(service
            .get_or_create_pool(ExecutionEnvironment::Local)
            .is_none());
    }

    #[test]
    fn missing_helper_yields_none() {
        let service = ProcMacroApplicationService::new(config_with_helper(PathBuf::from(
            "/no/such/helper-binary",
        )));
        assert!(matches!(
            service.pool(ExecutionEnvironment::Local),
            Err(PoolUnavailable::ExecutableNotFound(_))
        ));
    }

    #[test]
    fn unconfigured_helper_yields_none() {
        let service = ProcMacroApplicationService::new(ProcMacroConfig::default());
        assert_eq!(
            service.pool(ExecutionEnvironment::Local).err(),
            Some(PoolUnavailable::ExecutableNotFound(
                "no helper is configured".to_string()
            ))
        );
    }

    #[test]
    fn pools_are_shared_per_environment() {
        let (_dir, helper) = existing_file();
        let mut config = config_with_helper(helper);
        config.remote = Some(RemoteConfig {
            launcher: vec!["ssh".to_string(), "builder".to_string()],
        });
        let service = ProcMacroApplicationService::new(config);

        let a = service.get_or_create_pool(ExecutionEnvironment::Local).unwrap();
        let b = service.get_or_create_pool(ExecutionEnvironment::Local).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let remote = service
            .get_or_create_pool(ExecutionEnvironment::Remote)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &remote));
        assert_eq!(remote.environment(), ExecutionEnvironment::Remote);
    }

    #[test]
    fn remote_requires_configuration() {
        let (_dir, helper) = existing_file();
        let service = ProcMacroApplicationService::new(config_with_helper(helper));
        assert_eq!(
            service.pool(ExecutionEnvironment::Remote).err(),
            Some(PoolUnavailable::NoEnvironment(ExecutionEnvironment::Remote))
        );
    }

    #[test]
    fn dispose_forgets_pools() {
        let (_dir, helper) = existing_file();
        let service = ProcMacroApplicationService::new(config_with_helper(helper));
        let before = service.get_or_create_pool(ExecutionEnvironment::Local).unwrap();
        service.dispose();
        let after = service.get_or_create_pool(ExecutionEnvironment::Local).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
