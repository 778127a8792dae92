//! Generator façade.
//! Binds a project root and a template root, renders one template per call and
//! writes the result atomically to its destination.

use crate::config::GeneratorOptions;
use crate::context::{Context, ContextResolver};
use crate::error::{Error, Result};
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer};
use crate::store::TemplateStore;
use log::{debug, info};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tempfile::NamedTempFile;

/// Resources owned while the generator is ready.
struct Session {
    store: Arc<TemplateStore>,
    resolver: ContextResolver,
    renderer: MiniJinjaRenderer,
    /// Resolved at most once per session
    context: Mutex<Option<Arc<Context>>>,
}

impl Session {
    fn context(&self) -> Result<Arc<Context>> {
        let mut slot = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(context) = slot.as_ref() {
            return Ok(Arc::clone(context));
        }

        debug!("Resolving context of {}", self.resolver.project_root().display());
        let context = Arc::new(self.resolver.resolve()?);
        *slot = Some(Arc::clone(&context));
        Ok(context)
    }

    fn render(&self, template: &str, extra: Option<&Context>) -> Result<String> {
        let source = self.store.load(template)?;
        let context = self.context()?;
        let value = match extra {
            Some(extra) => {
                let mut merged = Context::clone(&context);
                merged.merge(extra);
                merged.to_value()
            }
            None => context.to_value(),
        };

        self.renderer.render(template, &source, &value)
    }
}

/// Template-driven file generator bound to a project and a template root.
///
/// The generator is `Send + Sync`: `generate_file` may be called from several
/// threads at once. Resources are released by [`Generator::close`] or on drop.
pub struct Generator {
    project_path: PathBuf,
    template_path: PathBuf,
    /// `None` once closed
    session: RwLock<Option<Session>>,
}

impl Generator {
    /// Creates a generator with default options.
    ///
    /// # Errors
    /// * `Error::InvalidPath` if either path is not an existing, readable directory
    pub fn new<P, T>(project_path: P, template_path: T) -> Result<Self>
    where
        P: AsRef<Path>,
        T: AsRef<Path>,
    {
        Self::with_options(project_path, template_path, GeneratorOptions::default())
    }

    /// Creates a generator with the given options.
    ///
    /// # Errors
    /// * `Error::InvalidPath` if either path is not an existing, readable directory
    /// * `Error::InvalidProject` if `eager_context` is set and the manifest cannot be resolved
    pub fn with_options<P, T>(
        project_path: P,
        template_path: T,
        options: GeneratorOptions,
    ) -> Result<Self>
    where
        P: AsRef<Path>,
        T: AsRef<Path>,
    {
        let project_path = project_path.as_ref();
        let template_path = template_path.as_ref();
        validate_dir(project_path)?;
        validate_dir(template_path)?;

        let store = Arc::new(TemplateStore::new(template_path, options.cache_templates)?);
        let mut renderer = MiniJinjaRenderer::with_store(Arc::clone(&store));
        renderer.set_keep_trailing_newline(options.keep_trailing_newline);

        let session = Session {
            store,
            resolver: ContextResolver::new(project_path),
            renderer,
            context: Mutex::new(None),
        };
        if options.eager_context {
            session.context()?;
        }

        debug!(
            "Generator ready (project: {}, templates: {})",
            project_path.display(),
            template_path.display()
        );

        Ok(Self {
            project_path: project_path.to_path_buf(),
            template_path: template_path.to_path_buf(),
            session: RwLock::new(Some(session)),
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn is_closed(&self) -> bool {
        self.session.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Returns the project context, resolving it on first use.
    pub fn context(&self) -> Result<Arc<Context>> {
        self.with_session(|session| session.context())
    }

    /// Lists the identifiers of all templates under the template root.
    pub fn templates(&self) -> Result<Vec<String>> {
        self.with_session(|session| session.store.templates())
    }

    /// Renders `src_path` against the project context without writing it.
    pub fn render(&self, src_path: &str) -> Result<String> {
        self.with_session(|session| session.render(src_path, None))
    }

    /// Renders `src_path` and writes it to `dst_path`.
    ///
    /// A relative `dst_path` is taken relative to the project root. Parent
    /// directories are created and an existing file is replaced. On failure the
    /// destination is left untouched.
    ///
    /// # Returns
    /// * `Result<PathBuf>` - The path that was written
    pub fn generate_file<D: AsRef<Path>>(&self, src_path: &str, dst_path: D) -> Result<PathBuf> {
        self.generate(src_path, dst_path.as_ref(), None)
    }

    /// Like [`Generator::generate_file`], with `extra` overlaid on the project
    /// context for this call only.
    pub fn generate_file_with<D: AsRef<Path>>(
        &self,
        src_path: &str,
        dst_path: D,
        extra: &Context,
    ) -> Result<PathBuf> {
        self.generate(src_path, dst_path.as_ref(), Some(extra))
    }

    /// Releases cached templates and the resolved context.
    ///
    /// Calling it again is a no-op.
    pub fn close(&self) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = session.take() {
            session.store.clear();
            debug!("Generator closed (project: {})", self.project_path.display());
        }
    }

    fn generate(&self, src_path: &str, dst_path: &Path, extra: Option<&Context>) -> Result<PathBuf> {
        let content = self.with_session(|session| session.render(src_path, extra))?;

        let target = self.project_path.join(dst_path);
        write_file(&target, &content)?;

        info!("Generated '{}' from '{}'", target.display(), src_path);
        Ok(target)
    }

    fn with_session<R>(&self, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        match session.as_ref() {
            Some(session) => f(session),
            None => Err(Error::UseAfterClose),
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("project_path", &self.project_path)
            .field("template_path", &self.template_path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn validate_dir(path: &Path) -> Result<()> {
    let invalid = |reason: String| Error::InvalidPath { path: path.display().to_string(), reason };

    let metadata = fs::metadata(path).map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    fs::read_dir(path).map_err(|e| invalid(format!("not readable: {}", e)))?;
    Ok(())
}

/// Writes `content` to a temporary file next to `path`, then moves it into place.
fn write_file(path: &Path, content: &str) -> Result<()> {
    let write_failed =
        |source: io::Error| Error::WriteFailed { path: path.display().to_string(), source };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_failed)?;

    let mut file = NamedTempFile::new_in(parent).map_err(write_failed)?;
    file.write_all(content.as_bytes()).map_err(write_failed)?;
    file.as_file().sync_all().map_err(write_failed)?;
    set_permissions(&file, path).map_err(write_failed)?;

    file.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

/// Keeps the permissions of a replaced file; new files get the usual 0644.
fn set_permissions(file: &NamedTempFile, path: &Path) -> io::Result<()> {
    if let Ok(metadata) = fs::metadata(path) {
        return file.as_file().set_permissions(metadata.permissions());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}
