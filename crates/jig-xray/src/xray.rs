//! The Xray configuration and the scan operation.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use jig_membrane::{ProxyKind, SharedRegistry};
use jig_realm::{ObjectId, ObjectKind, Realm, Value};
use tracing::debug;

use crate::error::{XrayError, XrayResult};
use crate::node::Node;
use crate::scanner::{Purpose, SCANNERS, Scanner, Verdict};
use crate::token::{TokenLoader, TokenSaver};

/// Serializer over one realm's object graph.
///
/// The plain configuration handles data only: primitives, objects, arrays,
/// byte arrays, sets, and maps. Attaching a registry turns on token
/// handling, and [`Xray::allow_deployables`] / [`Xray::allow_arbitrary`]
/// enable the remaining scanners.
#[derive(Clone, Default)]
pub struct Xray {
    registry: Option<SharedRegistry>,
    saver: Option<Rc<dyn TokenSaver>>,
    loader: Option<Rc<dyn TokenLoader>>,
    restricted_owner: Option<ObjectId>,
    deployables: bool,
    arbitrary: bool,
}

impl fmt::Debug for Xray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xray")
            .field("tokens", &self.registry.is_some())
            .field("saver", &self.saver.is_some())
            .field("loader", &self.loader.is_some())
            .field("restricted_owner", &self.restricted_owner)
            .field("deployables", &self.deployables)
            .field("arbitrary", &self.arbitrary)
            .finish()
    }
}

/// Tokens and undeployed classes found by [`Xray::scan`], in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Token proxies.
    pub tokens: Vec<ObjectId>,
    /// Raw classes that have no code proxy yet.
    pub deployables: Vec<ObjectId>,
}

impl Xray {
    /// A data-only Xray.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognise jigs and code through `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Save tokens with `saver` when serializing.
    #[must_use]
    pub fn with_saver(mut self, saver: Rc<dyn TokenSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Load tokens with `loader` when deserializing.
    #[must_use]
    pub fn with_loader(mut self, loader: Rc<dyn TokenLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Refuse inner objects owned by anything but `owner`.
    #[must_use]
    pub fn restrict_owner(mut self, owner: ObjectId) -> Self {
        self.restricted_owner = Some(owner);
        self
    }

    /// Collect undeployed classes instead of rejecting them.
    #[must_use]
    pub fn allow_deployables(mut self) -> Self {
        self.deployables = true;
        self
    }

    /// Accept instances of deployed classes.
    #[must_use]
    pub fn allow_arbitrary(mut self) -> Self {
        self.arbitrary = true;
        self
    }

    pub(crate) fn has_saver(&self) -> bool {
        self.saver.is_some()
    }

    pub(crate) fn saver(&self) -> Option<&Rc<dyn TokenSaver>> {
        self.saver.as_ref()
    }

    pub(crate) fn loader(&self) -> Option<&Rc<dyn TokenLoader>> {
        self.loader.as_ref()
    }

    pub(crate) fn deployables_enabled(&self) -> bool {
        self.deployables
    }

    pub(crate) fn arbitrary_enabled(&self) -> bool {
        self.arbitrary
    }

    /// The token proxy standing for `id`, whether `id` is the proxy itself
    /// or its raw target.
    pub(crate) fn token_proxy(&self, realm: &Realm, id: ObjectId) -> Option<ObjectId> {
        let registry = self.registry.as_ref()?.borrow();
        if registry.is_token(id) {
            return Some(id);
        }
        registry
            .lookup_proxy(realm.resolve_target(id))
            .filter(|p| registry.is_token(*p))
    }

    /// First scanner that accepts `value` for `purpose`.
    pub(crate) fn classify(
        &self,
        realm: &Realm,
        value: &Value,
        purpose: Purpose,
        path: &Path,
    ) -> XrayResult<Scanner> {
        self.check_owner(realm, value, purpose, path)?;
        for scanner in SCANNERS {
            match scanner.claim(self, realm, value, purpose) {
                Some(Verdict::Accept) => return Ok(scanner),
                Some(Verdict::Refuse(reason)) => return Err(path.reject(realm, value, purpose, reason)),
                None => {},
            }
        }
        Err(path.reject(realm, value, purpose, "unsupported type"))
    }

    /// First scanner that accepts `node` for deserialization.
    pub(crate) fn classify_node(&self, node: &Node, path: &Path) -> XrayResult<Scanner> {
        for scanner in SCANNERS {
            match scanner.claim_node(self, node) {
                Some(Verdict::Accept) => return Ok(scanner),
                Some(Verdict::Refuse(reason)) => return Err(path.reject_node(node, reason)),
                None => {},
            }
        }
        Err(path.reject_node(node, "unsupported node"))
    }

    fn check_owner(&self, realm: &Realm, value: &Value, purpose: Purpose, path: &Path) -> XrayResult<()> {
        let (Some(restricted), Some(registry), Value::Object(id)) =
            (self.restricted_owner, &self.registry, value)
        else {
            return Ok(());
        };
        if !matches!(purpose, Purpose::Scan | Purpose::Serialize) {
            return Ok(());
        }
        let foreign = matches!(
            registry.borrow().kind(*id),
            Some(ProxyKind::Inner { owner }) if owner != restricted
        );
        if foreign {
            return Err(path.reject(
                realm,
                value,
                purpose,
                "belongs to another jig; clone it first",
            ));
        }
        Ok(())
    }

    /// Walk `value` and report the tokens and undeployed classes it reaches.
    ///
    /// # Errors
    ///
    /// [`XrayError::Rejected`] naming the deepest value no scanner accepts.
    pub fn scan(&self, realm: &Realm, value: &Value) -> XrayResult<Discovered> {
        let mut walk = ScanWalk {
            xray: self,
            realm,
            seen: HashSet::new(),
            found: Discovered::default(),
            path: Path::root(),
        };
        walk.visit(value)?;
        debug!(
            tokens = walk.found.tokens.len(),
            deployables = walk.found.deployables.len(),
            "scanned"
        );
        Ok(walk.found)
    }
}

struct ScanWalk<'a> {
    xray: &'a Xray,
    realm: &'a Realm,
    seen: HashSet<ObjectId>,
    found: Discovered,
    path: Path,
}

impl ScanWalk<'_> {
    fn visit(&mut self, value: &Value) -> XrayResult<()> {
        let scanner = self.xray.classify(self.realm, value, Purpose::Scan, &self.path)?;
        let Value::Object(id) = value else {
            return Ok(());
        };
        match scanner {
            Scanner::Token => {
                if let Some(proxy) = self.xray.token_proxy(self.realm, *id) {
                    if !self.found.tokens.contains(&proxy) {
                        self.found.tokens.push(proxy);
                    }
                }
                Ok(())
            },
            Scanner::Deployable => {
                let class = self.realm.resolve_target(*id);
                if !self.found.deployables.contains(&class) {
                    self.found.deployables.push(class);
                }
                Ok(())
            },
            _ => {
                let target = self.realm.resolve_target(*id);
                if !self.seen.insert(target) {
                    return Ok(());
                }
                for (segment, child) in members(self.realm, value, scanner, Purpose::Scan, &self.path)? {
                    self.path.push(segment);
                    self.visit(&child)?;
                    self.path.pop();
                }
                Ok(())
            },
        }
    }
}

/// One step from a container to a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
    MapKey(usize),
    MapValue(usize),
    Class,
}

/// Location of the value being visited, for error messages.
#[derive(Debug, Clone, Default)]
pub(crate) struct Path(Vec<Segment>);

impl Path {
    pub(crate) fn root() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub(crate) fn pop(&mut self) {
        self.0.pop();
    }

    pub(crate) fn reject(
        &self,
        realm: &Realm,
        value: &Value,
        purpose: Purpose,
        reason: impl Into<String>,
    ) -> XrayError {
        XrayError::Rejected {
            purpose,
            culprit: describe(realm, value),
            path: self.to_string(),
            reason: reason.into(),
        }
    }
}

impl Path {
    pub(crate) fn reject_node(&self, node: &Node, reason: impl Into<String>) -> XrayError {
        XrayError::Rejected {
            purpose: Purpose::Deserialize,
            culprit: node.tag(),
            path: self.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value")?;
        for segment in &self.0 {
            match segment {
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
                Segment::MapKey(i) => write!(f, ".<key {i}>")?,
                Segment::MapValue(i) => write!(f, ".<value {i}>")?,
                Segment::Class => f.write_str(".<class>")?,
            }
        }
        Ok(())
    }
}

/// A short rendering of a value and its runtime type.
pub(crate) fn describe(realm: &Realm, value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_nan() => "NaN".to_owned(),
        Value::Number(n) if n.is_infinite() => {
            (if n.is_sign_positive() { "Infinity" } else { "-Infinity" }).to_owned()
        },
        Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Object(_) => format!("[object {}]", realm.type_name(value)),
    }
}

/// Enumerable own properties of a raw object, in insertion order.
pub(crate) fn enumerable(realm: &Realm, target: ObjectId) -> XrayResult<Vec<(String, Value)>> {
    Ok(realm
        .object(target)?
        .props
        .iter()
        .filter(|(_, p)| p.enumerable)
        .map(|(k, p)| (k.to_owned(), p.value.clone()))
        .collect())
}

/// Property entries with reserved keys refused.
pub(crate) fn checked_props(
    realm: &Realm,
    value: &Value,
    target: ObjectId,
    purpose: Purpose,
    path: &Path,
) -> XrayResult<Vec<(String, Value)>> {
    let props = enumerable(realm, target)?;
    if let Some((key, _)) = props.iter().find(|(k, _)| k.starts_with('$')) {
        return Err(path.reject(realm, value, purpose, format!("reserved key {key}")));
    }
    Ok(props)
}

/// Children of a container as `(segment, value)` pairs.
pub(crate) fn members(
    realm: &Realm,
    value: &Value,
    scanner: Scanner,
    purpose: Purpose,
    path: &Path,
) -> XrayResult<Vec<(Segment, Value)>> {
    let Value::Object(id) = value else {
        return Ok(Vec::new());
    };
    let target = realm.resolve_target(*id);
    let keyed = |props: Vec<(String, Value)>| props.into_iter().map(|(k, v)| (Segment::Key(k), v));
    let mut out: Vec<(Segment, Value)> = Vec::new();
    match (&realm.object(target)?.kind, scanner) {
        (ObjectKind::Array(items), Scanner::Array) | (ObjectKind::Set(items), Scanner::Set) => {
            out.extend(items.iter().cloned().enumerate().map(|(i, v)| (Segment::Index(i), v)));
        },
        (ObjectKind::Map(entries), Scanner::Map) => {
            for (i, (k, v)) in entries.iter().enumerate() {
                out.push((Segment::MapKey(i), k.clone()));
                out.push((Segment::MapValue(i), v.clone()));
            }
        },
        _ => {},
    }
    match scanner {
        Scanner::Object | Scanner::Set | Scanner::Map => {
            out.extend(keyed(checked_props(realm, value, target, purpose, path)?));
        },
        Scanner::Arbitrary => {
            out.extend(keyed(checked_props(realm, value, target, purpose, path)?));
            if let Some(class) = realm.owner_class(target) {
                out.push((Segment::Class, Value::Object(class)));
            }
        },
        _ => {},
    }
    Ok(out)
}
