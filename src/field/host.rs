//! FieldHost - one rendered input field inside a document
//!
//! Owns the widget and its bound field. Construction never fails: parse,
//! placement and resolution errors are kept and rendered in place of the
//! widget, as `INPUT[...] -> message` inline or as a card in a block.
//!
//! A block field is drawn as a card when it has a title or showcase, or is
//! a select / multi select:
//!
//! ```text
//! ┌ Status
//! │ (•) draft  ( ) done
//! └ INPUT[select(title(Status), option(draft), option(done), showcase):status]
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{BindingState, BoundField, FieldRegistry};
use crate::cache::MetadataManager;
use crate::declaration::{parse_declaration, InputFieldDeclaration};
use crate::error::{MetaBindError, Result};
use crate::signal::ListenerHandle;
use crate::store::{DocumentRef, DocumentStore};
use crate::widget::{is_image_path, InputField, Widget, WidgetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Within a line of text
    Inline,
    /// On its own line, possibly as a card
    Block,
}

/// Shared services every host in a session uses
#[derive(Debug, Clone)]
pub struct FieldContext {
    pub manager: Arc<MetadataManager>,
    pub registry: FieldRegistry,
}

impl FieldContext {
    pub fn new(manager: Arc<MetadataManager>) -> Self {
        Self {
            manager,
            registry: FieldRegistry::new(),
        }
    }
}

struct Parts {
    declaration: InputFieldDeclaration,
    widget: Arc<Mutex<Widget>>,
    field: Arc<BoundField>,
}

pub struct FieldHost {
    source: String,
    placement: Placement,
    ctx: FieldContext,
    parts: Option<Parts>,
    error: Option<MetaBindError>,
    write_listener: Option<ListenerHandle>,
    unloaded: bool,
}

impl FieldHost {
    pub fn new(source: &str, current: &DocumentRef, placement: Placement, ctx: FieldContext) -> Self {
        let (parts, error) = match Self::build(source, current, placement, &ctx) {
            Ok(parts) => (Some(parts), None),
            Err(e) => {
                tracing::debug!(declaration = source, error = %e, "input field in error state");
                (None, Some(e))
            }
        };
        Self {
            source: source.trim().to_string(),
            placement,
            ctx,
            parts,
            error,
            write_listener: None,
            unloaded: false,
        }
    }

    fn build(source: &str, current: &DocumentRef, placement: Placement, ctx: &FieldContext) -> Result<Parts> {
        let declaration = parse_declaration(source)?;
        if placement == Placement::Inline && !declaration.kind.allows_inline() {
            return Err(MetaBindError::Declaration {
                declaration: declaration.full_declaration.clone(),
                reason: format!("'{}' fields can not be used inline", declaration.kind),
            });
        }

        let widget = Widget::build(declaration.kind, &declaration.arguments)?;
        let target = declaration
            .bind_target
            .as_deref()
            .map(|raw| ctx.manager.resolve(raw, current))
            .transpose()?;

        Ok(Parts {
            declaration,
            widget: Arc::new(Mutex::new(widget)),
            field: Arc::new(BoundField::new(target)),
        })
    }

    /// Attach the widget to its metadata and show the current value
    pub async fn load(&mut self) {
        if self.unloaded || self.error.is_some() || self.write_listener.is_some() {
            return;
        }
        let Some(parts) = &self.parts else {
            return;
        };

        let queries = parts.widget.lock().option_queries().to_vec();
        if !queries.is_empty() {
            let found = scan_image_folders(self.ctx.manager.store().as_ref(), &queries).await;
            parts.widget.lock().add_options(found);
        }

        let widget = Arc::clone(&parts.widget);
        let listener = parts.field.write_signal().register_listener(move |value: &Option<Value>| {
            let mut widget = widget.lock();
            if !widget.is_equal_value(value.as_ref()) {
                widget.set_value(value.clone());
            }
        });
        self.write_listener = Some(listener);

        if let Err(e) = parts.field.load(&self.ctx.manager).await {
            tracing::warn!(declaration = %self.source, error = %e, "input field failed to load");
            parts.field.write_signal().unregister_listener(listener);
            self.write_listener = None;
            self.error = Some(e);
            return;
        }
        self.ctx.registry.add(Arc::clone(&parts.field));
    }

    /// Apply a user edit: show it, then publish the widget's value
    pub fn user_input(&self, value: Value) {
        if self.unloaded {
            return;
        }
        let Some(parts) = &self.parts else {
            return;
        };

        let published = {
            let mut widget = parts.widget.lock();
            widget.set_value(Some(value));
            widget.get_value()
        };
        parts.field.read_signal().set(Some(published));
    }

    /// Value the widget currently shows
    pub fn value(&self) -> Option<Value> {
        self.parts.as_ref().map(|p| p.widget.lock().get_value())
    }

    pub fn render(&self) -> String {
        if let Some(error) = &self.error {
            return match self.placement {
                Placement::Inline => format!("{} -> {}", self.source, error),
                Placement::Block => format!("┌ {}\n└ {}", self.source, error),
            };
        }
        let Some(parts) = &self.parts else {
            return self.source.clone();
        };

        let mut body = parts.widget.lock().render();
        let classes = parts.declaration.classes();
        if !classes.is_empty() {
            let classes: Vec<String> = classes.iter().map(|c| format!(".{c}")).collect();
            body = format!("{body} {{{}}}", classes.join(" "));
        }
        if !self.has_card() {
            return body;
        }

        let declaration = &parts.declaration;
        let mut card = Vec::new();
        if let Some(title) = declaration.title() {
            card.push(format!("┌ {title}"));
        }
        card.extend(body.lines().map(|line| format!("│ {line}")));
        if declaration.showcase() {
            card.push(format!("└ {}", declaration.full_declaration));
        }
        card.join("\n")
    }

    /// Block fields with a title, a showcase, or a list of options get a card
    fn has_card(&self) -> bool {
        let Some(parts) = &self.parts else {
            return false;
        };
        let declaration = &parts.declaration;
        self.placement == Placement::Block
            && (declaration.title().is_some()
                || declaration.showcase()
                || matches!(declaration.kind, WidgetKind::Select | WidgetKind::MultiSelect))
    }

    /// Tear down the widget and its binding; safe to repeat
    pub fn unload(&mut self) {
        if self.unloaded {
            return;
        }
        self.unloaded = true;

        if let Some(parts) = &self.parts {
            parts.widget.lock().destroy();
            if let Some(listener) = self.write_listener.take() {
                parts.field.write_signal().unregister_listener(listener);
            }
            self.ctx.registry.remove(parts.field.id());
            parts.field.unload();
        }
    }

    pub fn error(&self) -> Option<&MetaBindError> {
        self.error.as_ref()
    }

    pub fn state(&self) -> BindingState {
        match (&self.parts, &self.error) {
            (_, Some(_)) => BindingState::Errored,
            (Some(parts), None) => parts.field.state(),
            (None, None) => BindingState::Unbound,
        }
    }

    pub fn declaration(&self) -> Option<&InputFieldDeclaration> {
        self.parts.as_ref().map(|p| &p.declaration)
    }

    pub fn field(&self) -> Option<&Arc<BoundField>> {
        self.parts.as_ref().map(|p| &p.field)
    }

    pub fn render_count(&self) -> usize {
        self.parts.as_ref().map_or(0, |p| p.widget.lock().render_count())
    }
}

/// Images in each folder; unreadable folders are logged and skipped
async fn scan_image_folders(store: &dyn DocumentStore, folders: &[String]) -> Vec<String> {
    let mut images = Vec::new();
    for folder in folders {
        match store.list_folder(folder).await {
            Ok(files) => images.extend(files.into_iter().filter(|f| is_image_path(f))),
            Err(e) => tracing::warn!(folder = %folder, error = %e, "image option folder skipped"),
        }
    }
    images
}

impl Drop for FieldHost {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for FieldHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldHost")
            .field("source", &self.source)
            .field("placement", &self.placement)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn context() -> (MemoryStore, FieldContext, DocumentRef) {
        let store = MemoryStore::new();
        let doc = store.insert("D.md", json!({"done": true, "title": "Plan"}));
        store.insert_empty("a/Dup.md");
        store.insert_empty("b/Dup.md");
        let ctx = FieldContext::new(Arc::new(MetadataManager::new(Arc::new(store.clone()))));
        (store, ctx, doc)
    }

    #[tokio::test]
    async fn loads_current_value() {
        let (_store, ctx, doc) = context();
        let mut host = FieldHost::new("INPUT[toggle:done]", &doc, Placement::Inline, ctx.clone());
        host.load().await;

        assert_eq!(host.state(), BindingState::Bound);
        assert_eq!(host.value(), Some(json!(true)));
        assert_eq!(host.render(), "[x]");
        assert_eq!(ctx.registry.len(), 1);
    }

    #[tokio::test]
    async fn missing_value_shows_default_without_render() {
        let (_store, ctx, doc) = context();
        let mut host = FieldHost::new("INPUT[number(default(3)):count]", &doc, Placement::Inline, ctx);
        host.load().await;
        assert_eq!(host.value(), Some(json!(3)));
        assert_eq!(host.render_count(), 0);
    }

    #[tokio::test]
    async fn syntax_error_renders_in_place() {
        let (_store, ctx, doc) = context();
        let mut host = FieldHost::new("INPUT[text:a#b#c]", &doc, Placement::Inline, ctx.clone());
        host.load().await;

        assert_eq!(host.state(), BindingState::Errored);
        assert_eq!(host.error().map(|e| e.code()), Some("MB-010"));
        assert!(host.render().starts_with("INPUT[text:a#b#c] -> [MB-010]"));
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn ambiguous_target_renders_error() {
        let (_store, ctx, doc) = context();
        let host = FieldHost::new("INPUT[text:Dup#x]", &doc, Placement::Inline, ctx);
        assert!(host.render().contains("ambiguous target; qualify further"));
    }

    #[test]
    fn block_only_widget_rejected_inline() {
        let (_store, ctx, doc) = context();
        let host = FieldHost::new("INPUT[multi_select:tags]", &doc, Placement::Inline, ctx);
        assert_eq!(host.error().map(|e| e.code()), Some("MB-030"));
        assert!(host.render().contains("can not be used inline"));
    }

    #[tokio::test]
    async fn block_card_shows_title_and_showcase() {
        let (_store, ctx, doc) = context();
        let mut host = FieldHost::new(
            "INPUT[text(title(Name), showcase):title]",
            &doc,
            Placement::Block,
            ctx,
        );
        host.load().await;
        assert_eq!(
            host.render(),
            "┌ Name\n│ [Plan]\n└ INPUT[text(title(Name), showcase):title]"
        );
    }

    #[test]
    fn non_finite_slider_bound_is_an_error_state() {
        let (_store, ctx, doc) = context();
        for source in ["INPUT[slider(min(nan)):level]", "INPUT[slider(max(inf)):level]"] {
            let host = FieldHost::new(source, &doc, Placement::Inline, ctx.clone());
            assert_eq!(host.state(), BindingState::Errored);
            assert_eq!(host.error().map(|e| e.code()), Some("MB-031"));
            assert!(host.render().starts_with(&format!("{source} -> ")));
        }
    }

    #[tokio::test]
    async fn block_without_title_or_options_has_no_card() {
        let (_store, ctx, doc) = context();
        let mut plain = FieldHost::new("INPUT[toggle:done]", &doc, Placement::Block, ctx.clone());
        plain.load().await;
        assert_eq!(plain.render(), "[x]");

        let mut select = FieldHost::new(
            "INPUT[select(option(Plan), option(Later)):title]",
            &doc,
            Placement::Block,
            ctx,
        );
        select.load().await;
        assert_eq!(select.render(), "│ (•) Plan  ( ) Later");
    }

    #[test]
    fn block_error_renders_as_card() {
        let (_store, ctx, doc) = context();
        let host = FieldHost::new("INPUT[text:a#b#c]", &doc, Placement::Block, ctx);
        let rendered = host.render();
        assert!(rendered.starts_with("┌ INPUT[text:a#b#c]\n└ [MB-010]"), "{rendered}");
    }

    #[tokio::test]
    async fn classes_are_shown_after_the_widget() {
        let (_store, ctx, doc) = context();
        let mut host = FieldHost::new("INPUT[toggle(class(wide), class(red bold)):done]", &doc, Placement::Inline, ctx);
        host.load().await;
        assert_eq!(host.render(), "[x] {.wide .red .bold}");
    }

    #[tokio::test]
    async fn option_query_folders_are_scanned_on_load() {
        let (store, ctx, doc) = context();
        store.insert_file("covers/sunset.png");
        store.insert_file("covers/notes.txt");
        store.insert_file("covers/old/dawn.png");
        store.insert_file("icons/star.svg");

        let mut host = FieldHost::new(
            "INPUT[image_suggest(option_query(\"covers\"), option_query(icons), option_query(missing)):cover]",
            &doc,
            Placement::Block,
            ctx,
        );
        host.load().await;

        assert_eq!(host.state(), BindingState::Bound);
        assert_eq!(host.render(), "[no image]\nsuggestions: covers/sunset.png, icons/star.svg");
    }

    #[tokio::test]
    async fn unbound_field_keeps_value_locally() {
        let (store, ctx, doc) = context();
        let mut host = FieldHost::new("INPUT[text]", &doc, Placement::Inline, ctx.clone());
        host.load().await;
        host.user_input(json!("scratch"));

        assert_eq!(host.state(), BindingState::Unbound);
        assert_eq!(host.value(), Some(json!("scratch")));
        assert_eq!(ctx.manager.cache_count(), 0);
        assert_eq!(store.tree(&doc), Some(json!({"done": true, "title": "Plan"})));
    }

    #[tokio::test]
    async fn unload_is_idempotent_and_drop_safe() {
        let (_store, ctx, doc) = context();
        let mut host = FieldHost::new("INPUT[toggle:done]", &doc, Placement::Inline, ctx.clone());
        host.load().await;
        host.unload();
        host.unload();
        assert_eq!(host.state(), BindingState::Unloaded);
        assert!(ctx.registry.is_empty());
        assert_eq!(ctx.manager.cached(&doc).unwrap().subscriber_count(), 0);
        drop(host);
    }
}
