//! Template rendering for tmplgen.
//! Substitutes `{{ key }}` placeholders using MiniJinja, refusing to emit
//! output when a referenced key is not bound.
use crate::error::{Error, Result};
use crate::store::TemplateStore;
use cruet::Inflector;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Names MiniJinja provides itself; never looked up in the context.
const BUILTIN_NAMES: [&str; 10] =
    ["range", "dict", "debug", "namespace", "loop", "self", "super", "caller", "varargs", "kwargs"];

/// Trait for template rendering engines.
pub trait TemplateRenderer {
    /// Renders a template string with the given context.
    ///
    /// # Arguments
    /// * `name` - Template identifier, used in diagnostics
    /// * `template` - Template string to render
    /// * `context` - Context variables for rendering
    fn render(&self, name: &str, template: &str, context: &serde_json::Value) -> Result<String>;
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    /// MiniJinja environment instance
    env: Environment<'static>,
    /// Source of `include`, `extends` and `import` targets
    store: Option<Arc<TemplateStore>>,
}

impl MiniJinjaRenderer {
    /// Creates a renderer with strict undefined handling and the case filters.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_filter("snake_case", |value: String| value.to_snake_case());
        env.add_filter("kebab_case", |value: String| value.to_kebab_case());
        env.add_filter("pascal_case", |value: String| value.to_pascal_case());
        env.add_filter("camel_case", |value: String| value.to_camel_case());
        env.add_filter("screaming_snake_case", |value: String| value.to_screaming_snake_case());
        Self { env, store: None }
    }

    /// Creates a renderer whose `include`, `extends` and `import` tags load
    /// templates through `store`.
    pub fn with_store(store: Arc<TemplateStore>) -> Self {
        Self { store: Some(store), ..Self::new() }
    }

    /// Keeps or strips the final newline of rendered templates.
    pub fn set_keep_trailing_newline(&mut self, keep: bool) {
        self.env.set_keep_trailing_newline(keep);
    }

    /// Installs a loader reading from the store. Store failures are parked in
    /// `failure` so their kind survives MiniJinja's error wrapping.
    fn install_loader(
        &self,
        env: &mut Environment<'static>,
        failure: &Arc<Mutex<Option<Error>>>,
    ) {
        let store = match &self.store {
            Some(store) => Arc::clone(store),
            None => return,
        };
        let failure = Arc::clone(failure);
        env.set_loader(move |name| match store.load(name) {
            Ok(content) => Ok(Some(content.to_string())),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => {
                let err = minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string());
                *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                Err(err)
            }
        });
    }

    /// Turns a strict-mode undefined access, possibly raised inside an
    /// included template, into `Error::UnboundPlaceholder`.
    fn unbound_from(&self, err: &minijinja::Error, name: &str, source: &str) -> Option<Error> {
        let mut undefined = None;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(e) = e.downcast_ref::<minijinja::Error>() {
                if e.kind() == ErrorKind::UndefinedError {
                    undefined = Some(e);
                }
            }
            current = e.source();
        }

        let undefined = undefined?;
        let template = undefined.name().unwrap_or(name);
        let text: Arc<str> = if template == name {
            source.into()
        } else {
            self.store.as_ref()?.load(template).ok()?
        };
        let key = undefined.range().and_then(|range| text.get(range)).and_then(placeholder_key)?;

        Some(Error::UnboundPlaceholder { key, template: template.to_string() })
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        MiniJinjaRenderer::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    /// Renders a template string using MiniJinja.
    ///
    /// # Errors
    /// * `Error::UnboundPlaceholder` naming the first referenced key missing from `context`,
    ///   in this template or in one it includes
    /// * `Error::Traversal`, `Error::AccessDenied` if an included template cannot be loaded
    /// * `Error::Render` on syntax or evaluation errors
    fn render(&self, name: &str, template: &str, context: &serde_json::Value) -> Result<String> {
        let mut env = self.env.clone();
        let failure = Arc::new(Mutex::new(None));
        self.install_loader(&mut env, &failure);
        env.add_template_owned(name.to_string(), template.to_string())?;

        let tmpl = env.get_template(name)?;

        if let Some(key) = find_unbound(&tmpl.undeclared_variables(true), context) {
            return Err(Error::UnboundPlaceholder { key, template: name.to_string() });
        }

        tmpl.render(context).map_err(|err| {
            if let Some(store_err) = failure.lock().unwrap_or_else(PoisonError::into_inner).take() {
                return store_err;
            }
            self.unbound_from(&err, name, template).unwrap_or(Error::Render(err))
        })
    }
}

/// Extracts the variable path from the source span of an expression such as
/// `missing`, `author.email` or `{{ missing | upper }}`.
fn placeholder_key(expr: &str) -> Option<String> {
    let expr =
        expr.trim_start_matches(|c: char| c == '{' || c == '%' || c == '-' || c.is_whitespace());
    let key: String =
        expr.chars().take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.').collect();
    let key = key.trim_end_matches('.');
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Returns the first referenced variable path, in sorted order, that the
/// context does not bind.
pub fn find_unbound(variables: &HashSet<String>, context: &serde_json::Value) -> Option<String> {
    let mut variables: Vec<&String> = variables.iter().collect();
    variables.sort();

    variables
        .into_iter()
        .filter(|path| {
            let head = path.split('.').next().unwrap_or_default();
            !BUILTIN_NAMES.contains(&head)
        })
        .find(|path| !is_bound(path, context))
        .cloned()
}

/// A dotted path is bound when every object along it has the next segment.
/// Walking stops at the first non-object value; attribute access on scalars
/// is left to the template engine.
fn is_bound(path: &str, context: &serde_json::Value) -> bool {
    let mut current = context;
    for segment in path.split('.') {
        match current {
            serde_json::Value::Object(map) => match map.get(segment) {
                Some(value) => current = value,
                None => return false,
            },
            _ => return true,
        }
    }
    true
}
