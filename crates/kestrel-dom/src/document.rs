//! Document
//!
//! The live document of one view. Owns every entity and decides when
//! entities die; observers hear about it first.

use std::rc::Rc;

use tracing::{debug, info};
use url::Url;

use crate::arena::Arena;
use crate::control::{ControlSpec, ControlType, FormControl};
use crate::element::{Element, ElementKind};
use crate::form::{Form, FormSpec, FormSubmission};
use crate::observer::{EntityObserver, ObserverId};
use crate::session::SessionRequest;
use crate::{ControlKey, DomError, ElementKey, EntityId, FormKey, NodeSetKey};

/// Query behind a live node set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeQuery {
    /// Elements by tag name; `*` matches every element
    TagName(String),
    /// Elements by `name` attribute
    Name(String),
}

impl NodeQuery {
    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Self::TagName(tag) => tag == "*" || element.tag().eq_ignore_ascii_case(tag),
            Self::Name(name) => element.name() == Some(name.as_str()),
        }
    }
}

/// Live query result. Stores the query, never a snapshot.
#[derive(Debug, Clone)]
pub struct NodeSet {
    query: NodeQuery,
}

impl NodeSet {
    pub fn query(&self) -> &NodeQuery {
        &self.query
    }
}

/// Live document of one view
pub struct Document {
    url: Url,
    title: String,
    referrer: Option<Url>,
    status: String,

    elements: Arena<Element>,
    element_order: Vec<ElementKey>,
    forms: Arena<Form>,
    form_order: Vec<FormKey>,
    controls: Arena<FormControl>,
    node_sets: Arena<NodeSet>,

    focused: Option<ControlKey>,
    observers: Vec<(ObserverId, Rc<dyn EntityObserver>)>,
    next_observer: u32,
    requests: Vec<SessionRequest>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url.as_str())
            .field("elements", &self.elements.len())
            .field("forms", &self.forms.len())
            .field("controls", &self.controls.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Document {
    /// Create an empty document
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: String::new(),
            referrer: None,
            status: String::new(),
            elements: Arena::new(),
            element_order: Vec::new(),
            forms: Arena::new(),
            form_order: Vec::new(),
            controls: Arena::new(),
            node_sets: Arena::new(),
            focused: None,
            observers: Vec::new(),
            next_observer: 0,
            requests: Vec::new(),
        }
    }

    /// Parse `url` and create an empty document
    pub fn parse(url: &str) -> Result<Self, DomError> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Resolve a possibly relative reference against the document URL
    pub fn resolve(&self, reference: &str) -> Result<Url, DomError> {
        Ok(self.url.join(reference)?)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn referrer(&self) -> Option<&Url> {
        self.referrer.as_ref()
    }

    pub fn set_referrer(&mut self, referrer: Option<Url>) {
        self.referrer = referrer;
    }

    /// Status line text
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    // Building

    /// Append a plain element
    pub fn add_element(&mut self, tag: &str) -> ElementKey {
        let key = ElementKey(self.elements.insert(Element::new(tag, ElementKind::Plain)));
        self.element_order.push(key);
        key
    }

    /// Append a form
    pub fn add_form(&mut self, spec: FormSpec) -> FormKey {
        let element = self.add_element("form");
        let form = FormKey(self.forms.insert(Form {
            element,
            action: spec.action,
            method: spec.method,
            target: spec.target,
            controls: Vec::new(),
        }));
        if let Some(el) = self.elements.get_mut(element.0) {
            el.kind = ElementKind::Form(form);
            if let Some(id) = &spec.id {
                el.set_attribute("id", id);
            }
            if let Some(name) = &spec.name {
                el.set_attribute("name", name);
            }
        }
        self.form_order.push(form);
        form
    }

    /// Append a control to `form`
    pub fn add_control(&mut self, form: FormKey, spec: ControlSpec) -> Result<ControlKey, DomError> {
        if !self.forms.contains(form.0) {
            return Err(DomError::UnknownForm);
        }
        let element = self.add_element(spec.kind.tag());
        if let Some(el) = self.elements.get_mut(element.0) {
            if let Some(id) = &spec.id {
                el.set_attribute("id", id);
            }
            if let Some(name) = &spec.name {
                el.set_attribute("name", name);
            }
        }
        let control = FormControl::from_spec(spec, form, element);
        let key = ControlKey(self.controls.insert(control));
        if let Some(el) = self.elements.get_mut(element.0) {
            el.kind = ElementKind::Control(key);
        }
        if let Some(f) = self.forms.get_mut(form.0) {
            f.controls.push(key);
        }
        Ok(key)
    }

    // Access

    pub fn element(&self, key: ElementKey) -> Option<&Element> {
        self.elements.get(key.0)
    }

    pub fn element_mut(&mut self, key: ElementKey) -> Option<&mut Element> {
        self.elements.get_mut(key.0)
    }

    pub fn form(&self, key: FormKey) -> Option<&Form> {
        self.forms.get(key.0)
    }

    pub fn form_mut(&mut self, key: FormKey) -> Option<&mut Form> {
        self.forms.get_mut(key.0)
    }

    /// Element record of a form
    pub fn form_element(&self, key: FormKey) -> Option<&Element> {
        self.form(key).and_then(|f| self.element(f.element))
    }

    pub fn form_element_mut(&mut self, key: FormKey) -> Option<&mut Element> {
        let element = self.form(key)?.element;
        self.element_mut(element)
    }

    /// Forms in document order
    pub fn forms(&self) -> Vec<FormKey> {
        self.form_order.clone()
    }

    /// Action of a form resolved against the document URL
    pub fn form_action_url(&self, key: FormKey) -> Result<Url, DomError> {
        let form = self.form(key).ok_or(DomError::UnknownForm)?;
        self.resolve(&form.action)
    }

    pub fn control(&self, key: ControlKey) -> Option<&FormControl> {
        self.controls.get(key.0)
    }

    pub fn control_mut(&mut self, key: ControlKey) -> Option<&mut FormControl> {
        self.controls.get_mut(key.0)
    }

    /// Element record of a control
    pub fn control_element(&self, key: ControlKey) -> Option<&Element> {
        self.control(key).and_then(|c| self.element(c.element))
    }

    pub fn control_element_mut(&mut self, key: ControlKey) -> Option<&mut Element> {
        let element = self.control(key)?.element;
        self.element_mut(element)
    }

    /// Controls of a form in document order
    pub fn controls_of(&self, form: FormKey) -> Vec<ControlKey> {
        self.form(form).map(|f| f.controls.clone()).unwrap_or_default()
    }

    /// Elements in document order
    pub fn elements(&self) -> &[ElementKey] {
        &self.element_order
    }

    /// First element in document order with this `id`
    pub fn get_element_by_id(&self, id: &str) -> Option<ElementKey> {
        self.element_order
            .iter()
            .copied()
            .find(|k| self.element(*k).and_then(|e| e.id()) == Some(id))
    }

    /// Entity a script should see for an element
    pub fn entity_of(&self, key: ElementKey) -> Option<EntityId> {
        Some(match self.element(key)?.kind {
            ElementKind::Plain => EntityId::Element(key),
            ElementKind::Form(form) => EntityId::Form(form),
            ElementKind::Control(control) => EntityId::Control(control),
        })
    }

    // Node sets

    pub fn create_node_set(&mut self, query: NodeQuery) -> NodeSetKey {
        NodeSetKey(self.node_sets.insert(NodeSet { query }))
    }

    pub fn node_set(&self, key: NodeSetKey) -> Option<&NodeSet> {
        self.node_sets.get(key.0)
    }

    /// Current members of a node set, evaluated now
    pub fn node_set_items(&self, key: NodeSetKey) -> Option<Vec<ElementKey>> {
        let set = self.node_set(key)?;
        Some(
            self.element_order
                .iter()
                .copied()
                .filter(|k| self.element(*k).is_some_and(|e| set.query.matches(e)))
                .collect(),
        )
    }

    /// Drop a node set nobody references any more
    pub fn release_node_set(&mut self, key: NodeSetKey) {
        if self.node_sets.contains(key.0) {
            self.notify_detached(EntityId::NodeSet(key));
            self.node_sets.remove(key.0);
        }
    }

    // Form behaviour

    /// Restore every control of a form to its defaults
    pub fn reset_form(&mut self, key: FormKey) -> Result<(), DomError> {
        let controls = self.form(key).ok_or(DomError::UnknownForm)?.controls.clone();
        for control in controls {
            if let Some(c) = self.controls.get_mut(control.0) {
                c.reset();
            }
        }
        debug!("Form reset");
        Ok(())
    }

    /// Collect the successful controls of a form into a submission request
    pub fn submit_form(&mut self, key: FormKey) -> Result<(), DomError> {
        let form = self.form(key).ok_or(DomError::UnknownForm)?;
        let mut fields = Vec::new();
        for control in &form.controls {
            let Some(c) = self.control(*control) else { continue };
            let Some(name) = self.element(c.element).and_then(|e| e.name()) else { continue };
            if c.disabled {
                continue;
            }
            let successful = match c.kind {
                ControlType::Checkbox | ControlType::Radio => c.state.checked(),
                ControlType::Text | ControlType::Password | ControlType::Hidden => true,
                ControlType::Select => c.state.selected_index().is_some(),
                _ => false,
            };
            if successful {
                fields.push((name.to_string(), c.state.value().to_string()));
            }
        }
        let submission = FormSubmission {
            form: key,
            action: self.resolve(&form.action)?,
            method: form.method,
            target: form.target.clone(),
            fields,
        };
        info!("Form submission to {}", submission.action);
        self.request(SessionRequest::Submit(submission));
        Ok(())
    }

    /// Activate a control as if the user pressed it
    pub fn activate_control(&mut self, key: ControlKey) -> Result<(), DomError> {
        let control = self.control(key).ok_or(DomError::UnknownControl)?;
        let (kind, form) = (control.kind, control.form);
        match kind {
            ControlType::Checkbox => {
                if let Some(c) = self.control_mut(key) {
                    let checked = !c.state.checked();
                    c.state.set_checked(checked);
                }
            }
            ControlType::Radio => {
                let group = self.control_element(key).and_then(|e| e.name()).map(str::to_string);
                for other in self.controls_of(form) {
                    let same_group = self.control(other).is_some_and(|c| c.kind == ControlType::Radio)
                        && self.control_element(other).and_then(|e| e.name()) == group.as_deref();
                    if !same_group {
                        continue;
                    }
                    if let Some(c) = self.control_mut(other) {
                        c.state.set_checked(other == key);
                    }
                }
            }
            ControlType::Submit | ControlType::Image => return self.submit_form(form),
            ControlType::Reset => return self.reset_form(form),
            _ => {}
        }
        self.focused = Some(key);
        Ok(())
    }

    pub fn focus(&mut self, key: ControlKey) -> Result<(), DomError> {
        if !self.controls.contains(key.0) {
            return Err(DomError::UnknownControl);
        }
        self.focused = Some(key);
        Ok(())
    }

    /// Drop focus if `key` has it
    pub fn blur(&mut self, key: ControlKey) {
        if self.focused == Some(key) {
            self.focused = None;
        }
    }

    pub fn focused(&self) -> Option<ControlKey> {
        self.focused
    }

    // Lifecycle

    /// Replace the content with a new, empty page at `url`.
    ///
    /// Every form, control, element and node set of the old page is reported
    /// detached before it is destroyed. The document entity itself survives.
    pub fn navigate(&mut self, url: Url) {
        info!("Navigating document to {}", url);
        for key in self.controls.keys() {
            self.notify_detached(EntityId::Control(ControlKey(key)));
        }
        for key in self.form_order.clone() {
            self.notify_detached(EntityId::Form(key));
        }
        for key in self.element_order.clone() {
            if self.element(key).is_some_and(|e| e.kind == ElementKind::Plain) {
                self.notify_detached(EntityId::Element(key));
            }
        }
        for key in self.node_sets.keys() {
            self.notify_detached(EntityId::NodeSet(NodeSetKey(key)));
        }

        self.referrer = Some(std::mem::replace(&mut self.url, url));
        self.title.clear();
        self.elements.clear();
        self.element_order.clear();
        self.forms.clear();
        self.form_order.clear();
        self.controls.clear();
        self.node_sets.clear();
        self.focused = None;
    }

    /// Re-create every control under a fresh key, keeping its state.
    ///
    /// Old keys go stale; observers are told each control was retargeted.
    pub fn rerender(&mut self) {
        let mut moved = Vec::new();
        for form_key in self.form_order.clone() {
            let old_keys = self.controls_of(form_key);
            let mut new_keys = Vec::with_capacity(old_keys.len());
            for old in old_keys {
                let Some(control) = self.controls.remove(old.0) else { continue };
                let element = control.element;
                let new = ControlKey(self.controls.insert(control));
                if let Some(el) = self.elements.get_mut(element.0) {
                    el.kind = ElementKind::Control(new);
                }
                if self.focused == Some(old) {
                    self.focused = Some(new);
                }
                new_keys.push(new);
                moved.push((old, new));
            }
            if let Some(f) = self.forms.get_mut(form_key.0) {
                f.controls = new_keys;
            }
        }
        debug!("Re-rendered {} controls", moved.len());
        for (old, new) in moved {
            self.notify_retargeted(EntityId::Control(old), EntityId::Control(new));
        }
    }

    /// Remove a control and its element
    pub fn remove_control(&mut self, key: ControlKey) -> Result<(), DomError> {
        if !self.controls.contains(key.0) {
            return Err(DomError::UnknownControl);
        }
        self.notify_detached(EntityId::Control(key));
        let Some(control) = self.controls.remove(key.0) else {
            return Err(DomError::UnknownControl);
        };
        if let Some(f) = self.forms.get_mut(control.form.0) {
            f.controls.retain(|k| *k != key);
        }
        self.elements.remove(control.element.0);
        self.element_order.retain(|k| *k != control.element);
        self.blur(key);
        Ok(())
    }

    // Observers

    pub fn add_observer(&mut self, observer: Rc<dyn EntityObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) {
        self.observers.retain(|(i, _)| *i != id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn observers(&self) -> Vec<Rc<dyn EntityObserver>> {
        self.observers.iter().map(|(_, o)| o.clone()).collect()
    }

    fn notify_detached(&self, entity: EntityId) {
        for observer in self.observers() {
            observer.detached(entity);
        }
    }

    fn notify_retargeted(&self, old: EntityId, new: EntityId) {
        for observer in self.observers() {
            observer.retargeted(old, new);
        }
    }

    // Session requests

    /// Record a request for the session
    pub fn request(&mut self, request: SessionRequest) {
        debug!("Session request: {:?}", request);
        self.requests.push(request);
    }

    pub fn requests(&self) -> &[SessionRequest] {
        &self.requests
    }

    /// Hand every recorded request to the session
    pub fn take_requests(&mut self) -> Vec<SessionRequest> {
        std::mem::take(&mut self.requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormMethod;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        detached: RefCell<Vec<EntityId>>,
        retargeted: RefCell<Vec<(EntityId, EntityId)>>,
    }

    impl EntityObserver for Recorder {
        fn detached(&self, entity: EntityId) {
            self.detached.borrow_mut().push(entity);
        }

        fn retargeted(&self, old: EntityId, new: EntityId) {
            self.retargeted.borrow_mut().push((old, new));
        }
    }

    fn sample() -> (Document, FormKey, ControlKey) {
        let mut doc = Document::parse("http://example.com/page.html").unwrap();
        let form = doc.add_form(FormSpec::new().with_name("f").with_action("/go"));
        let input = doc
            .add_control(form, ControlSpec::new(ControlType::Text).with_name("x").with_value("a"))
            .unwrap();
        (doc, form, input)
    }

    #[test]
    fn test_form_action_resolves() {
        let (doc, form, _) = sample();
        assert_eq!(doc.form_action_url(form).unwrap().as_str(), "http://example.com/go");
    }

    #[test]
    fn test_rerender_retargets() {
        let (mut doc, form, input) = sample();
        let recorder = Rc::new(Recorder::default());
        doc.add_observer(recorder.clone());

        doc.rerender();
        let new = doc.controls_of(form)[0];
        assert_ne!(new, input);
        assert!(doc.control(input).is_none());
        assert_eq!(doc.control(new).unwrap().state.value(), "a");
        assert_eq!(
            recorder.retargeted.borrow().as_slice(),
            &[(EntityId::Control(input), EntityId::Control(new))]
        );
    }

    #[test]
    fn test_navigate_detaches_before_destroying() {
        let (mut doc, form, input) = sample();
        let recorder = Rc::new(Recorder::default());
        doc.add_observer(recorder.clone());

        doc.navigate(Url::parse("http://example.com/next").unwrap());
        let detached = recorder.detached.borrow();
        assert!(detached.contains(&EntityId::Control(input)));
        assert!(detached.contains(&EntityId::Form(form)));
        assert!(doc.forms().is_empty());
        assert_eq!(doc.referrer().unwrap().as_str(), "http://example.com/page.html");
    }

    #[test]
    fn test_node_set_is_live() {
        let (mut doc, _, _) = sample();
        let set = doc.create_node_set(NodeQuery::TagName("input".into()));
        assert_eq!(doc.node_set_items(set).unwrap().len(), 1);

        let form = doc.add_form(FormSpec::new());
        doc.add_control(form, ControlSpec::new(ControlType::Hidden)).unwrap();
        assert_eq!(doc.node_set_items(set).unwrap().len(), 2);
    }

    #[test]
    fn test_radio_group_activation() {
        let mut doc = Document::parse("http://example.com/").unwrap();
        let form = doc.add_form(FormSpec::new());
        let a = doc
            .add_control(form, ControlSpec::new(ControlType::Radio).with_name("g").with_checked(true))
            .unwrap();
        let b = doc.add_control(form, ControlSpec::new(ControlType::Radio).with_name("g")).unwrap();

        doc.activate_control(b).unwrap();
        assert!(!doc.control(a).unwrap().state.checked());
        assert!(doc.control(b).unwrap().state.checked());
        assert_eq!(doc.focused(), Some(b));
    }

    #[test]
    fn test_submit_collects_successful_controls() {
        let mut doc = Document::parse("http://example.com/").unwrap();
        let form = doc.add_form(FormSpec::new().with_action("/s").with_method(FormMethod::Get));
        doc.add_control(form, ControlSpec::new(ControlType::Text).with_name("q").with_value("hi"))
            .unwrap();
        doc.add_control(form, ControlSpec::new(ControlType::Checkbox).with_name("c")).unwrap();
        let submit = doc.add_control(form, ControlSpec::new(ControlType::Submit).with_name("go")).unwrap();

        doc.activate_control(submit).unwrap();
        let requests = doc.take_requests();
        let [SessionRequest::Submit(submission)] = requests.as_slice() else {
            panic!("expected one submission, got {:?}", requests);
        };
        assert_eq!(submission.fields, vec![("q".to_string(), "hi".to_string())]);
        assert_eq!(submission.url().as_str(), "http://example.com/s?q=hi");
    }
}
