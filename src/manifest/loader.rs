//! Recursive manifest loading.
//!
//! Expands the import graph from a root manifest into the resolved project
//! set, applying import overrides during descent, project overrides after
//! expansion, and attribute filtering last. Imported manifest files are read
//! through [`ImportSource`] so resolution is testable without a git binary.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::git::{CloneOptions, FetchOptions, Git};
use crate::manifest::{
    AttributeSet, Hook, Import, Manifest, Package, Project, ProjectKey,
};
use crate::workspace::Workspace;

/// Where imported manifest files come from.
pub trait ImportSource {
    /// Read a `<localimport file=…/>` target, relative to the importing
    /// manifest. `repo` is `None` while still inside the root repository.
    fn read_local(&self, repo: Option<&Import>, file: &str) -> Result<String>;

    /// Read `file` from the manifest repository an `<import/>` names, at its
    /// pinned revision (or remote branch head when unpinned).
    fn read_import(&self, import: &Import, file: &str) -> Result<String>;
}

/// The fixed point of manifest expansion.
#[derive(Debug, Default)]
pub struct LoadedManifest {
    pub projects: IndexMap<ProjectKey, Project>,
    pub hooks: Vec<Hook>,
    pub packages: Vec<Package>,
    /// Projects dropped by attribute filtering, for diagnostics.
    pub dropped_projects: Vec<ProjectKey>,
    /// Packages dropped by attribute filtering, for diagnostics.
    pub dropped_packages: Vec<String>,
}

impl LoadedManifest {
    /// Projects sorted by key, for deterministic iteration in the planner
    /// and the lockfile resolver.
    pub fn sorted_projects(&self) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self.projects.values().collect();
        projects.sort_by(|a, b| a.key().cmp(&b.key()));
        projects
    }
}

/// Identity of a manifest file for cycle detection: the repository key (None
/// for the root repository) plus the file path within it.
type ManifestId = (Option<ProjectKey>, String);

pub struct ManifestLoader<'a> {
    source: &'a dyn ImportSource,
    active_attributes: AttributeSet,
    /// Manifests currently being expanded; re-entering one is a cycle.
    loading: Vec<ManifestId>,
    /// Manifests fully expanded; re-importing one is a diamond, not an error.
    done: HashSet<ManifestId>,
    projects: IndexMap<ProjectKey, Project>,
    hooks: Vec<Hook>,
    packages: Vec<Package>,
    project_overrides: HashMap<ProjectKey, Project>,
    import_overrides: HashMap<(ProjectKey, String), Import>,
}

impl<'a> ManifestLoader<'a> {
    pub fn new(source: &'a dyn ImportSource, active_attributes: AttributeSet) -> Self {
        Self {
            source,
            active_attributes,
            loading: Vec::new(),
            done: HashSet::new(),
            projects: IndexMap::new(),
            hooks: Vec::new(),
            packages: Vec::new(),
            project_overrides: HashMap::new(),
            import_overrides: HashMap::new(),
        }
    }

    /// Expand `root` (already parsed; `root_file` names it for cycle
    /// detection) into the resolved project set.
    pub fn load(mut self, root: &Manifest, root_file: &str) -> Result<LoadedManifest> {
        self.collect_overrides(root)?;
        let id = (None, root_file.to_string());
        self.expand(root, id, None, "")?;
        self.apply_project_overrides()?;
        self.filter_and_validate()
    }

    fn collect_overrides(&mut self, root: &Manifest) -> Result<()> {
        for project in &root.overrides.projects {
            let key = project.key();
            if self
                .project_overrides
                .insert(key.clone(), project.clone())
                .is_some()
            {
                return Err(Error::Config(format!(
                    "more than one project override matches {key}"
                )));
            }
        }
        for import in &root.overrides.imports {
            let key = (import.key(), import.manifest.clone());
            if self.import_overrides.insert(key, import.clone()).is_some() {
                return Err(Error::Config(format!(
                    "more than one import override matches {}={} manifest {}",
                    import.name, import.remote, import.manifest
                )));
            }
        }
        Ok(())
    }

    fn expand(
        &mut self,
        manifest: &Manifest,
        id: ManifestId,
        repo: Option<&Import>,
        root_prefix: &str,
    ) -> Result<()> {
        if self.loading.contains(&id) {
            let chain: Vec<String> = self
                .loading
                .iter()
                .map(|(_, file)| file.clone())
                .chain(std::iter::once(id.1.clone()))
                .collect();
            return Err(Error::Conflict(format!(
                "manifest import cycle: {}",
                chain.join(" -> ")
            )));
        }
        if self.done.contains(&id) {
            return Ok(());
        }
        if !manifest.overrides.is_empty() && !self.loading.is_empty() {
            return Err(Error::Config(format!(
                "overrides are only allowed in the root manifest (found in {})",
                id.1
            )));
        }
        self.loading.push(id.clone());

        for import in &manifest.imports.imports {
            let import = self.overridden_import(import);
            let content = self.source.read_import(&import, &import.manifest)?;
            let parsed = Manifest::parse(&content).map_err(|e| {
                Error::Config(format!(
                    "import {} (manifest {}): {e}",
                    import.name, import.manifest
                ))
            })?;
            let child_prefix = join_prefix(root_prefix, &import.root);
            let child_id = (Some(import.key()), import.manifest.clone());
            self.expand(&parsed, child_id, Some(&import), &child_prefix)?;
        }

        for local in &manifest.imports.local_imports {
            let content = self.source.read_local(repo, &local.file)?;
            let parsed = Manifest::parse(&content)
                .map_err(|e| Error::Config(format!("localimport {}: {e}", local.file)))?;
            let child_id = (repo.map(Import::key), local.file.clone());
            self.expand(&parsed, child_id, repo, root_prefix)?;
        }

        for project in &manifest.projects.projects {
            let mut project = project.clone();
            if !root_prefix.is_empty() {
                project.path = join_prefix(root_prefix, &project.path);
            }
            self.add_project(project)?;
        }
        self.hooks.extend(manifest.hooks.hooks.iter().cloned());
        for package in &manifest.packages.packages {
            self.add_package(package.clone())?;
        }

        self.loading.pop();
        self.done.insert(id);
        Ok(())
    }

    fn overridden_import(&self, import: &Import) -> Import {
        let key = (import.key(), import.manifest.clone());
        match self.import_overrides.get(&key) {
            Some(o) => {
                let mut rewritten = import.clone();
                if !o.remote.is_empty() {
                    rewritten.remote = o.remote.clone();
                }
                if !o.revision.is_empty() {
                    rewritten.revision = o.revision.clone();
                }
                if !o.remote_branch.is_empty() {
                    rewritten.remote_branch = o.remote_branch.clone();
                }
                rewritten
            }
            None => import.clone(),
        }
    }

    fn add_project(&mut self, project: Project) -> Result<()> {
        let key = project.key();
        match self.projects.get(&key) {
            None => {
                self.projects.insert(key, project);
                Ok(())
            }
            // An idempotent duplicate (diamond imports declaring the same
            // project identically) is fine; anything else is fatal.
            Some(existing) if *existing == project => Ok(()),
            Some(existing) => Err(Error::Conflict(format!(
                "duplicate project {key} with conflicting definitions \
                 (paths {:?} and {:?})",
                existing.path, project.path
            ))),
        }
    }

    fn add_package(&mut self, package: Package) -> Result<()> {
        match self.packages.iter().find(|p| p.name == package.name) {
            None => {
                self.packages.push(package);
                Ok(())
            }
            Some(existing) if *existing == package => Ok(()),
            Some(existing) => Err(Error::Conflict(format!(
                "duplicate package {} with conflicting versions ({} and {})",
                package.name, existing.version, package.version
            ))),
        }
    }

    fn apply_project_overrides(&mut self) -> Result<()> {
        for (key, over) in &self.project_overrides {
            let Some(project) = self.projects.get_mut(key) else {
                return Err(Error::NotFound(format!(
                    "project override {key} matches no project"
                )));
            };
            if !over.path.is_empty() {
                project.path = over.path.clone();
            }
            if !over.revision.is_empty() {
                project.revision = over.revision.clone();
            }
            if !over.remote_branch.is_empty() {
                project.remote_branch = over.remote_branch.clone();
            }
            if !over.gerrit_host.is_empty() {
                project.gerrit_host = over.gerrit_host.clone();
            }
            if !over.git_hooks.is_empty() {
                project.git_hooks = over.git_hooks.clone();
            }
            if !over.attributes.is_empty() {
                project.attributes = over.attributes.clone();
            }
            if over.history_depth.is_some() {
                project.history_depth = over.history_depth;
            }
            if over.git_submodules {
                project.git_submodules = true;
            }
            if !over.git_submodule_of.is_empty() {
                project.git_submodule_of = over.git_submodule_of.clone();
            }
        }
        Ok(())
    }

    fn filter_and_validate(mut self) -> Result<LoadedManifest> {
        let active = self.active_attributes.clone();
        let overridden: HashSet<ProjectKey> = self.project_overrides.keys().cloned().collect();

        let mut dropped_projects = Vec::new();
        self.projects.retain(|key, project| {
            let attrs = project.attribute_set();
            let keep =
                attrs.is_empty() || attrs.intersects(&active) || overridden.contains(key);
            if !keep {
                dropped_projects.push(key.clone());
            }
            keep
        });

        let mut dropped_packages = Vec::new();
        self.packages.retain(|package| {
            let attrs = package.attribute_set();
            let keep = attrs.is_empty() || attrs.intersects(&active);
            if !keep {
                dropped_packages.push(package.name.clone());
            }
            keep
        });

        // Hooks whose owning project was filtered out go with it; a hook
        // naming a project that never existed is an authoring error.
        let known: HashSet<&str> = self.projects.values().map(|p| p.name.as_str()).collect();
        let dropped_names: HashSet<String> = dropped_projects
            .iter()
            .map(|k| k.name.clone())
            .collect();
        let mut hooks = Vec::new();
        for hook in std::mem::take(&mut self.hooks) {
            if known.contains(hook.project.as_str()) {
                hooks.push(hook);
            } else if !dropped_names.contains(&hook.project) {
                return Err(Error::NotFound(format!(
                    "hook {:?} names unknown project {:?}",
                    hook.name, hook.project
                )));
            }
        }

        validate_paths(&self.projects)?;

        Ok(LoadedManifest {
            projects: self.projects,
            hooks,
            packages: self.packages,
            dropped_projects,
            dropped_packages,
        })
    }
}

/// Unique paths (K2) and controlled nesting (K3). Key uniqueness (K1) is
/// already enforced at insertion.
fn validate_paths(projects: &IndexMap<ProjectKey, Project>) -> Result<()> {
    let mut by_path: HashMap<&str, &ProjectKey> = HashMap::new();
    for (key, project) in projects {
        if let Some(other) = by_path.insert(project.path.as_str(), key) {
            return Err(Error::Conflict(format!(
                "projects {other} and {key} share path {:?}",
                project.path
            )));
        }
    }
    for (key, project) in projects {
        for (other_key, other) in projects {
            if key == other_key {
                continue;
            }
            let child = Path::new(&project.path);
            let parent = Path::new(&other.path);
            // Nesting is legal only when the ancestor declares it expects
            // nested children.
            if child.starts_with(parent) && !other.git_submodules {
                return Err(Error::Conflict(format!(
                    "project {key} at {:?} is nested inside {other_key} at {:?} \
                     without a submodule declaration",
                    project.path, other.path
                )));
            }
        }
    }
    Ok(())
}

fn join_prefix(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}/{rest}"),
    }
}

/// Production [`ImportSource`]: local-manifest projects read from their
/// checkouts, everything else from a cached clone of the manifest repository
/// at the pinned revision.
pub struct GitImportSource {
    root_manifest_dir: PathBuf,
    cache_root: PathBuf,
    /// Checked-out manifest projects, consulted when `use_local` is set.
    local_projects: HashMap<ProjectKey, PathBuf>,
    use_local: bool,
}

impl GitImportSource {
    pub fn new(
        workspace: &Workspace,
        local_projects: HashMap<ProjectKey, PathBuf>,
        use_local: bool,
    ) -> Self {
        let root_manifest_dir = workspace
            .root_manifest_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workspace.root().to_path_buf());
        Self {
            root_manifest_dir,
            cache_root: workspace.meta_dir().join("manifest-cache"),
            local_projects,
            use_local,
        }
    }

    fn cached_repo(&self, import: &Import) -> Result<Git> {
        let dir = self.cache_root.join(sanitize(&import.name));
        let git = Git::at(&dir);
        if !dir.join(".git").exists() {
            std::fs::create_dir_all(&self.cache_root)?;
            let parent = Git::at(&self.cache_root);
            let opts = CloneOptions {
                no_checkout: true,
                ..Default::default()
            };
            parent.clone(&import.remote, &dir, &opts)?;
        } else {
            git.fetch("origin", &FetchOptions::default())?;
        }
        Ok(git)
    }

    fn import_revision(&self, git: &Git, import: &Import) -> Result<String> {
        if !import.revision.is_empty() && import.revision != "HEAD" {
            return Ok(import.revision.clone());
        }
        Ok(git.rev_parse(&format!("refs/remotes/origin/{}", import.remote_branch()))?)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl ImportSource for GitImportSource {
    fn read_local(&self, repo: Option<&Import>, file: &str) -> Result<String> {
        match repo {
            // Still in the root repository: the file sits next to the root
            // manifest on disk.
            None => {
                let path = self.root_manifest_dir.join(file);
                std::fs::read_to_string(&path).map_err(|e| {
                    Error::NotFound(format!("localimport {}: {e}", path.display()))
                })
            }
            Some(import) => self.read_import(import, file),
        }
    }

    fn read_import(&self, import: &Import, file: &str) -> Result<String> {
        if self.use_local
            && let Some(checkout) = self.local_projects.get(&import.key())
        {
            let path = checkout.join(file);
            return std::fs::read_to_string(&path).map_err(|e| {
                Error::NotFound(format!(
                    "local manifest {} (project {}): {e}",
                    path.display(),
                    import.name
                ))
            });
        }
        let git = self.cached_repo(import)?;
        let revision = self.import_revision(&git, import)?;
        Ok(git.show_file(&revision, file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test source backed by a map of (repo name, file) -> content.
    struct MapSource {
        files: HashMap<(String, String), String>,
    }

    impl MapSource {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self {
                files: entries
                    .iter()
                    .map(|(repo, file, content)| {
                        ((repo.to_string(), file.to_string()), content.to_string())
                    })
                    .collect(),
            }
        }
    }

    impl ImportSource for MapSource {
        fn read_local(&self, repo: Option<&Import>, file: &str) -> Result<String> {
            let repo_name = repo.map(|i| i.name.as_str()).unwrap_or("root");
            self.files
                .get(&(repo_name.to_string(), file.to_string()))
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("{repo_name}:{file}")))
        }

        fn read_import(&self, import: &Import, file: &str) -> Result<String> {
            self.files
                .get(&(import.name.clone(), file.to_string()))
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("{}:{file}", import.name)))
        }
    }

    fn load(
        root_xml: &str,
        source: &MapSource,
        attrs: &str,
    ) -> Result<LoadedManifest> {
        let root = Manifest::parse(root_xml).unwrap();
        ManifestLoader::new(source, AttributeSet::parse(attrs)).load(&root, "manifest")
    }

    fn empty_source() -> MapSource {
        MapSource {
            files: HashMap::new(),
        }
    }

    #[test]
    fn loads_projects_from_root() {
        let out = load(
            r#"<manifest><projects>
                 <project name="a" path="a" remote="https://x/a"/>
                 <project name="b" path="b" remote="https://x/b"/>
               </projects></manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 2);
    }

    #[test]
    fn expands_imports_with_root_prefix() {
        let source = MapSource::new(&[(
            "base",
            "base/root",
            r#"<manifest><projects>
                 <project name="lib" path="lib" remote="https://x/lib"/>
               </projects></manifest>"#,
        )]);
        let out = load(
            r#"<manifest>
                 <imports>
                   <import name="base" manifest="base/root" remote="https://x/base"
                           revision="1111111111111111111111111111111111111111"
                           root="third_party"/>
                 </imports>
               </manifest>"#,
            &source,
            "",
        )
        .unwrap();
        let key = ProjectKey::new("lib", "https://x/lib");
        assert_eq!(out.projects[&key].path, "third_party/lib");
    }

    #[test]
    fn detects_import_cycles() {
        let source = MapSource::new(&[
            (
                "a",
                "m",
                r#"<manifest><imports>
                     <import name="b" manifest="m" remote="https://x/b"/>
                   </imports></manifest>"#,
            ),
            (
                "b",
                "m",
                r#"<manifest><imports>
                     <import name="a" manifest="m" remote="https://x/a"/>
                   </imports></manifest>"#,
            ),
        ]);
        let err = load(
            r#"<manifest><imports>
                 <import name="a" manifest="m" remote="https://x/a"/>
               </imports></manifest>"#,
            &source,
            "",
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn diamond_imports_are_not_cycles() {
        let shared = r#"<manifest><projects>
             <project name="common" path="common" remote="https://x/common"/>
           </projects></manifest>"#;
        let source = MapSource::new(&[
            (
                "left",
                "m",
                r#"<manifest><imports>
                     <import name="shared" manifest="m" remote="https://x/shared"/>
                   </imports></manifest>"#,
            ),
            (
                "right",
                "m",
                r#"<manifest><imports>
                     <import name="shared" manifest="m" remote="https://x/shared"/>
                   </imports></manifest>"#,
            ),
            ("shared", "m", shared),
        ]);
        let out = load(
            r#"<manifest><imports>
                 <import name="left" manifest="m" remote="https://x/left"/>
                 <import name="right" manifest="m" remote="https://x/right"/>
               </imports></manifest>"#,
            &source,
            "",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 1);
    }

    #[test]
    fn conflicting_duplicate_projects_are_fatal() {
        let err = load(
            r#"<manifest><projects>
                 <project name="a" path="one" remote="https://x/a"/>
                 <project name="a" path="two" remote="https://x/a"/>
               </projects></manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "{err}");
    }

    #[test]
    fn identical_duplicate_projects_are_idempotent() {
        let out = load(
            r#"<manifest><projects>
                 <project name="a" path="a" remote="https://x/a"/>
                 <project name="a" path="a" remote="https://x/a"/>
               </projects></manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 1);
    }

    #[test]
    fn import_override_rewrites_revision_before_descent() {
        use std::cell::RefCell;

        /// Source that records the revision each import was read at.
        struct RecordingSource {
            seen: RefCell<Vec<String>>,
        }

        impl ImportSource for RecordingSource {
            fn read_local(&self, _repo: Option<&Import>, file: &str) -> Result<String> {
                Err(Error::NotFound(file.to_string()))
            }

            fn read_import(&self, import: &Import, _file: &str) -> Result<String> {
                self.seen.borrow_mut().push(import.revision.clone());
                Ok(r#"<manifest><projects>
                        <project name="lib" path="lib" remote="https://x/lib"/>
                      </projects></manifest>"#
                    .to_string())
            }
        }

        let root = Manifest::parse(
            r#"<manifest>
                 <imports>
                   <import name="base" manifest="m" remote="https://x/base"
                           revision="1111111111111111111111111111111111111111"/>
                 </imports>
                 <overrides>
                   <import name="base" manifest="m" remote="https://x/base"
                           revision="2222222222222222222222222222222222222222"/>
                 </overrides>
               </manifest>"#,
        )
        .unwrap();
        let source = RecordingSource {
            seen: RefCell::new(Vec::new()),
        };
        let out = ManifestLoader::new(&source, AttributeSet::default())
            .load(&root, "manifest")
            .unwrap();
        assert_eq!(out.projects.len(), 1);
        assert_eq!(
            source.seen.borrow().as_slice(),
            ["2222222222222222222222222222222222222222"]
        );
    }

    #[test]
    fn project_override_applies_after_expansion() {
        let out = load(
            r#"<manifest>
                 <projects>
                   <project name="a" path="a" remote="https://x/a"
                            revision="1111111111111111111111111111111111111111"/>
                 </projects>
                 <overrides>
                   <project name="a" path="a" remote="https://x/a"
                            revision="2222222222222222222222222222222222222222"/>
                 </overrides>
               </manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap();
        let key = ProjectKey::new("a", "https://x/a");
        assert_eq!(
            out.projects[&key].revision,
            "2222222222222222222222222222222222222222"
        );
    }

    #[test]
    fn override_without_match_is_fatal() {
        let err = load(
            r#"<manifest>
                 <overrides>
                   <project name="ghost" path="g" remote="https://x/g"/>
                 </overrides>
               </manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err}");
    }

    #[test]
    fn attribute_filtering_drops_non_matching() {
        let out = load(
            r#"<manifest><projects>
                 <project name="always" path="always" remote="https://x/always"/>
                 <project name="opt" path="opt" remote="https://x/opt" attributes="debug"/>
               </projects>
               <packages>
                 <package name="tools/gn" version="v1" attributes="debug"/>
               </packages></manifest>"#,
            &empty_source(),
            "release",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 1);
        assert_eq!(out.dropped_projects.len(), 1);
        assert!(out.packages.is_empty());
        assert_eq!(out.dropped_packages, vec!["tools/gn"]);
    }

    #[test]
    fn override_forces_inclusion_despite_attributes() {
        let out = load(
            r#"<manifest>
                 <projects>
                   <project name="opt" path="opt" remote="https://x/opt" attributes="debug"/>
                 </projects>
                 <overrides>
                   <project name="opt" path="opt" remote="https://x/opt"
                            revision="2222222222222222222222222222222222222222"/>
                 </overrides>
               </manifest>"#,
            &empty_source(),
            "release",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 1);
    }

    #[test]
    fn nested_paths_require_submodule_declaration() {
        let err = load(
            r#"<manifest><projects>
                 <project name="outer" path="outer" remote="https://x/outer"/>
                 <project name="inner" path="outer/inner" remote="https://x/inner"/>
               </projects></manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "{err}");
    }

    #[test]
    fn declared_submodule_nesting_is_allowed() {
        let out = load(
            r#"<manifest><projects>
                 <project name="outer" path="outer" remote="https://x/outer"
                          gitsubmodules="true"/>
                 <project name="inner" path="outer/inner" remote="https://x/inner"
                          gitsubmoduleof="outer"/>
               </projects></manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 2);
    }

    #[test]
    fn hook_for_filtered_project_is_dropped() {
        let out = load(
            r#"<manifest>
                 <projects>
                   <project name="opt" path="opt" remote="https://x/opt" attributes="debug"/>
                 </projects>
                 <hooks>
                   <hook name="setup" project="opt" action="setup.sh"/>
                 </hooks>
               </manifest>"#,
            &empty_source(),
            "release",
        )
        .unwrap();
        assert!(out.hooks.is_empty());
    }

    #[test]
    fn hook_for_unknown_project_is_fatal() {
        let err = load(
            r#"<manifest><hooks>
                 <hook name="setup" project="ghost" action="setup.sh"/>
               </hooks></manifest>"#,
            &empty_source(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err}");
    }

    #[test]
    fn localimport_reads_sibling_file() {
        let source = MapSource::new(&[(
            "root",
            "private",
            r#"<manifest><projects>
                 <project name="extra" path="extra" remote="https://x/extra"/>
               </projects></manifest>"#,
        )]);
        let out = load(
            r#"<manifest><imports><localimport file="private"/></imports></manifest>"#,
            &source,
            "",
        )
        .unwrap();
        assert_eq!(out.projects.len(), 1);
    }

    #[test]
    fn overrides_outside_root_are_rejected() {
        let source = MapSource::new(&[(
            "base",
            "m",
            r#"<manifest>
                 <overrides>
                   <project name="x" path="x" remote="https://x/x"/>
                 </overrides>
               </manifest>"#,
        )]);
        let err = load(
            r#"<manifest><imports>
                 <import name="base" manifest="m" remote="https://x/base"/>
               </imports></manifest>"#,
            &source,
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }
}
