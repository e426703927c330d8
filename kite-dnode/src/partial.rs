use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;

use crate::error::{ArgumentError, DnodeError};
use crate::unscrub;
use crate::value::{CallValue, Function};
use crate::path::Path;

/// A stub waiting to be installed at a path during reassembly.
#[derive(Clone)]
pub struct CallbackSpec {
    pub path: Path,
    pub function: Function,
}

/// A lazily-decoded argument tree: raw JSON bytes plus the callback specs
/// not yet applied.
///
/// Specs may be attached at any time before (or between) decodes; each
/// [`decode`](Partial::decode) applies everything queued so far, so the
/// final decode wins. A `Partial` can be passed through several nesting
/// levels before anything is parsed; [`slice`](Partial::slice) and
/// [`map`](Partial::map) redistribute the queued specs to the child that
/// owns each path, which is what lets an inner holder reassemble lazily.
///
/// Every projection comes in a fallible `try` form and a `must_*` form
/// that raises an [`ArgumentError`] panic payload; the dispatcher converts
/// that panic back into an error notification.
#[derive(Clone)]
pub struct Partial {
    raw: Arc<str>,
    specs: Arc<Mutex<Vec<CallbackSpec>>>,
}

impl Partial {
    pub fn from_raw(raw: impl Into<Arc<str>>) -> Partial {
        Partial {
            raw: raw.into(),
            specs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Partial, DnodeError> {
        Ok(Partial::from_raw(value.to_string()))
    }

    /// The raw JSON fragment, undecoded.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Queue a stub for installation on the next decode.
    pub fn add_spec(&self, spec: CallbackSpec) {
        self.specs.lock().unwrap().push(spec);
    }

    pub fn add_specs(&self, specs: impl IntoIterator<Item = CallbackSpec>) {
        self.specs.lock().unwrap().extend(specs);
    }

    fn queued_specs(&self) -> Vec<CallbackSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Parse the fragment and install every queued stub at its path.
    pub fn decode(&self) -> Result<CallValue, DnodeError> {
        let value: serde_json::Value = serde_json::from_str(&self.raw)?;
        let mut tree = CallValue::from(value);
        for spec in self.queued_specs() {
            unscrub::install(&mut tree, spec.path.segs(), spec.function);
        }
        Ok(tree)
    }

    /// Decode into a typed value. Callback positions deserialize as the
    /// placeholder string; use [`function`](Partial::function) or
    /// [`decode`](Partial::decode) to reach the stubs themselves.
    pub fn to<T: DeserializeOwned>(&self) -> Result<T, DnodeError> {
        Ok(serde_json::from_str(&self.raw)?)
    }

    fn shape(&self) -> String {
        const LIMIT: usize = 60;
        let raw = self.raw.trim();
        if raw.len() > LIMIT {
            format!("{}…", &raw[..raw.char_indices().take(LIMIT).last().map(|(i, c)| i + c.len_utf8()).unwrap_or(0)])
        } else {
            raw.to_string()
        }
    }

    // ── Sequence projections ─────────────────────────────────────────────

    /// Project as a sequence, redistributing queued specs: element `i`
    /// receives the specs addressed under index `i`, prefix stripped.
    pub fn slice(&self) -> Result<Vec<Partial>, DnodeError> {
        let value: serde_json::Value = serde_json::from_str(&self.raw)?;
        let serde_json::Value::Array(items) = value else {
            return Err(ArgumentError::new("sequence", self.shape()).into());
        };

        let specs = self.queued_specs();
        let children: Vec<Partial> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let child = Partial::from_raw(item.to_string());
                for spec in &specs {
                    if let Some((first, rest)) = spec.path.split_first() {
                        if first.as_index() == Some(i) {
                            child.add_spec(CallbackSpec {
                                path: rest,
                                function: spec.function.clone(),
                            });
                        }
                    }
                }
                child
            })
            .collect();
        Ok(children)
    }

    /// Project as a sequence of exactly `n` elements.
    pub fn slice_of(&self, n: usize) -> Result<Vec<Partial>, DnodeError> {
        let items = self.slice()?;
        if items.len() != n {
            return Err(ArgumentError::new(
                "sequence of fixed length",
                format!("{} elements", items.len()),
            )
            .into());
        }
        Ok(items)
    }

    /// The first element of the argument sequence.
    pub fn one(&self) -> Result<Partial, DnodeError> {
        self.slice()?
            .into_iter()
            .next()
            .ok_or_else(|| ArgumentError::new("non-empty sequence", self.shape()).into())
    }

    // ── Mapping projection ───────────────────────────────────────────────

    /// Project as a string-keyed mapping, redistributing queued specs by
    /// leading key.
    pub fn map(&self) -> Result<BTreeMap<String, Partial>, DnodeError> {
        let value: serde_json::Value = serde_json::from_str(&self.raw)?;
        let serde_json::Value::Object(fields) = value else {
            return Err(ArgumentError::new("mapping", self.shape()).into());
        };

        let specs = self.queued_specs();
        let mut out = BTreeMap::new();
        for (key, field) in &fields {
            let child = Partial::from_raw(field.to_string());
            for spec in &specs {
                if let Some((first, rest)) = spec.path.split_first() {
                    if first.as_key() == key.as_str() {
                        child.add_spec(CallbackSpec {
                            path: rest,
                            function: spec.function.clone(),
                        });
                    }
                }
            }
            out.insert(key.clone(), child);
        }
        Ok(out)
    }

    // ── Scalar projections ───────────────────────────────────────────────

    pub fn string(&self) -> Result<String, DnodeError> {
        serde_json::from_str(&self.raw)
            .map_err(|_| ArgumentError::new("string", self.shape()).into())
    }

    pub fn float64(&self) -> Result<f64, DnodeError> {
        serde_json::from_str(&self.raw)
            .map_err(|_| ArgumentError::new("number", self.shape()).into())
    }

    pub fn boolean(&self) -> Result<bool, DnodeError> {
        serde_json::from_str(&self.raw)
            .map_err(|_| ArgumentError::new("boolean", self.shape()).into())
    }

    /// The callable at this position. Present when a queued spec targets
    /// this exact node (empty path).
    pub fn function(&self) -> Result<Function, DnodeError> {
        for spec in self.queued_specs() {
            if spec.path.is_empty() {
                return Ok(spec.function);
            }
        }
        Err(ArgumentError::new("function", self.shape()).into())
    }

    // ── Panicking forms ──────────────────────────────────────────────────

    pub fn must_slice(&self) -> Vec<Partial> {
        unwrap_or_raise(self.slice())
    }

    pub fn must_slice_of(&self, n: usize) -> Vec<Partial> {
        unwrap_or_raise(self.slice_of(n))
    }

    pub fn must_one(&self) -> Partial {
        unwrap_or_raise(self.one())
    }

    pub fn must_map(&self) -> BTreeMap<String, Partial> {
        unwrap_or_raise(self.map())
    }

    pub fn must_string(&self) -> String {
        unwrap_or_raise(self.string())
    }

    pub fn must_float64(&self) -> f64 {
        unwrap_or_raise(self.float64())
    }

    pub fn must_boolean(&self) -> bool {
        unwrap_or_raise(self.boolean())
    }

    pub fn must_function(&self) -> Function {
        unwrap_or_raise(self.function())
    }
}

fn unwrap_or_raise<T>(result: Result<T, DnodeError>) -> T {
    match result {
        Ok(v) => v,
        Err(DnodeError::Argument(err)) => err.raise(),
        Err(err) => ArgumentError::new("decodable fragment", err.to_string()).raise(),
    }
}

impl std::fmt::Debug for Partial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Partial({})", self.shape())
    }
}
