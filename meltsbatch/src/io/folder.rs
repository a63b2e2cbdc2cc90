//! Per-run working directories under the batch base directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::error::RunError;
use crate::core::meltsfile::{ENV_FILE_NAME, input_file_name, render_envfile, render_meltsfile};
use crate::core::types::{EnvironmentSpec, PreparedRun};

/// A materialized run folder and the files the engine reads from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFolder {
    pub dir: PathBuf,
    pub input_file: String,
    pub input_path: PathBuf,
    pub env_path: PathBuf,
}

/// Folder path for run `name`.
pub fn run_dir(base_dir: &Path, name: &str) -> PathBuf {
    base_dir.join(name)
}

/// Create `base_dir/<run.name>` and write the input and environment files.
///
/// Creating the folder is the claim on the run: an existing folder is
/// `FolderExists` unless `overwrite` is set, in which case it is replaced.
/// Rendering happens first so a bad run never leaves an empty folder behind.
#[instrument(skip_all, fields(run = %run.name, overwrite))]
pub fn materialize(
    base_dir: &Path,
    run: &PreparedRun,
    env: &EnvironmentSpec,
    overwrite: bool,
) -> Result<RunFolder, RunError> {
    let input = render_meltsfile(run)?;
    let environment = render_envfile(env);

    fs::create_dir_all(base_dir)
        .map_err(|err| RunError::io(format!("create {}", base_dir.display()), err))?;

    let dir = run_dir(base_dir, &run.name);
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            if !overwrite {
                return Err(RunError::FolderExists { path: dir });
            }
            debug!(dir = %dir.display(), "replacing existing run folder");
            fs::remove_dir_all(&dir)
                .map_err(|err| RunError::io(format!("remove {}", dir.display()), err))?;
            fs::create_dir(&dir)
                .map_err(|err| RunError::io(format!("create {}", dir.display()), err))?;
        }
        Err(err) => return Err(RunError::io(format!("create {}", dir.display()), err)),
    }

    let input_file = input_file_name(&run.name);
    let input_path = dir.join(&input_file);
    let env_path = dir.join(ENV_FILE_NAME);
    write_file(&input_path, &input)?;
    write_file(&env_path, &environment)?;
    debug!(input = %input_path.display(), "run folder ready");

    Ok(RunFolder {
        dir,
        input_file,
        input_path,
        env_path,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), RunError> {
    fs::write(path, contents).map_err(|err| RunError::io(format!("write {}", path.display()), err))
}
