// src/project/store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{GomanderError, Result};
use crate::fs::FileSystem;
use crate::project::model::{Project, ProjectSummary, validate_project_id};

const PROJECTS_DIR: &str = "projects";
const PROJECT_EXT: &str = "toml";

/// One TOML file per project under `<data-dir>/projects/`.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
}

impl ProjectStore {
    pub fn new(fs: Arc<dyn FileSystem>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            fs,
            dir: data_dir.as_ref().join(PROJECTS_DIR),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_project_id(id)?;
        Ok(self.dir.join(format!("{id}.{PROJECT_EXT}")))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id)
            .map(|p| self.fs.exists(&p))
            .unwrap_or(false)
    }

    /// Summaries of every readable project, sorted by name.
    ///
    /// Files that fail to parse are skipped with a warning rather than
    /// hiding every other project.
    pub fn list(&self) -> Result<Vec<ProjectSummary>> {
        if !self.fs.is_dir(&self.dir) {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for path in self.fs.read_dir(&self.dir)? {
            if path.extension().and_then(|e| e.to_str()) != Some(PROJECT_EXT) {
                continue;
            }
            match self.read_file(&path) {
                Ok(project) => summaries.push(project.summary()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable project file");
                }
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    pub fn load(&self, id: &str) -> Result<Project> {
        let path = self.path_for(id)?;
        if !self.fs.exists(&path) {
            return Err(GomanderError::project_not_found(id));
        }
        let project = self.read_file(&path)?;
        if project.id != id {
            return Err(GomanderError::Validation(format!(
                "project file {} declares id '{}'",
                path.display(),
                project.id
            )));
        }
        Ok(project)
    }

    /// Validate and write the project.
    pub fn save(&self, project: &Project) -> Result<()> {
        project.validate()?;
        let path = self.path_for(&project.id)?;
        let contents = toml::to_string_pretty(project)?;
        self.fs.write(&path, contents.as_bytes())?;
        debug!(project = %project.id, path = %path.display(), "project saved");
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        if !self.fs.exists(&path) {
            return Err(GomanderError::project_not_found(id));
        }
        self.fs.remove_file(&path)?;
        info!(project = %id, "project deleted");
        Ok(())
    }

    /// Write a copy of the project to an arbitrary path.
    pub fn export(&self, id: &str, dest: &Path) -> Result<()> {
        let project = self.load(id)?;
        let contents = toml::to_string_pretty(&project)?;
        self.fs.write(dest, contents.as_bytes())?;
        info!(project = %id, dest = %dest.display(), "project exported");
        Ok(())
    }

    /// Parse and validate a file that is about to be imported, without
    /// storing anything.
    pub fn read_import(&self, path: &Path) -> Result<Project> {
        self.read_file(path)
    }

    /// Import a project file under fresh ids, optionally renaming it.
    pub fn import(&self, path: &Path, name: Option<&str>) -> Result<Project> {
        let mut project = self.read_import(path)?.with_fresh_ids();
        if let Some(name) = name {
            project.name = name.to_string();
        }
        self.save(&project)?;
        info!(project = %project.id, source = %path.display(), "project imported");
        Ok(project)
    }

    fn read_file(&self, path: &Path) -> Result<Project> {
        let contents = self.fs.read_to_string(path)?;
        let project: Project = toml::from_str(&contents)?;
        project.validate()?;
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::registry::model::Command;

    fn store() -> (Arc<MockFileSystem>, ProjectStore) {
        let fs = Arc::new(MockFileSystem::new());
        let store = ProjectStore::new(fs.clone(), "/data");
        (fs, store)
    }

    #[test]
    fn save_list_load_delete() {
        let (_fs, store) = store();
        let mut project = Project::new("zeta", "/w");
        project
            .commands
            .push(Command::new(project.id.clone(), "c", "echo c"));
        store.save(&project).unwrap();
        store.save(&Project::new("alpha", "/w")).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(store.load(&project.id).unwrap(), project);

        store.delete(&project.id).unwrap();
        assert!(matches!(
            store.load(&project.id),
            Err(GomanderError::NotFound { .. })
        ));
    }

    #[test]
    fn list_skips_broken_files() {
        let (fs, store) = store();
        store.save(&Project::new("ok", "/w")).unwrap();
        fs.add_file("/data/projects/broken.toml", "not = [valid");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn export_then_import_gets_new_ids() {
        let (_fs, store) = store();
        let project = Project::new("demo", "/w");
        store.save(&project).unwrap();
        store
            .export(&project.id, Path::new("/tmp/demo.toml"))
            .unwrap();

        let preview = store.read_import(Path::new("/tmp/demo.toml")).unwrap();
        assert_eq!(preview.id, project.id);

        let imported = store
            .import(Path::new("/tmp/demo.toml"), Some("demo copy"))
            .unwrap();
        assert_ne!(imported.id, project.id);
        assert_eq!(imported.name, "demo copy");
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
