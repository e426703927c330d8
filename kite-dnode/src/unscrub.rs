use crate::partial::CallbackSpec;
use crate::path::PathSeg;
use crate::scrub::CallbackMap;
use crate::value::{CallValue, Function};

/// Install a stub at a path inside a decoded argument tree.
///
/// The walk follows the kind of the value at each step: sequences consume
/// the segment as an index (numeric strings accepted), mappings consume it
/// as a key. An empty path replaces the root. A path that runs into a
/// missing or scalar node is tolerated silently; callbacks addressed at
/// absent optional fields are simply dropped.
pub fn install(root: &mut CallValue, path: &[PathSeg], function: Function) {
    if path.is_empty() {
        *root = CallValue::Function(function);
        return;
    }
    if let Some(slot) = descend(root, path) {
        *slot = CallValue::Function(function);
    }
}

fn descend<'a>(value: &'a mut CallValue, path: &[PathSeg]) -> Option<&'a mut CallValue> {
    let (seg, rest) = path.split_first()?;
    let child = match value {
        CallValue::Array(items) => items.get_mut(seg.as_index()?)?,
        CallValue::Object(fields) => fields.get_mut(seg.as_key().as_ref())?,
        _ => return None,
    };
    if rest.is_empty() {
        Some(child)
    } else {
        descend(child, rest)
    }
}

/// Turn a received callback map into specs, materializing one stub per
/// entry through the given factory. Ids that do not parse as integers are
/// skipped.
pub fn specs_from_map(
    callbacks: &CallbackMap,
    make_stub: impl Fn(u64) -> Function,
) -> Vec<CallbackSpec> {
    callbacks
        .iter()
        .filter_map(|(id, path)| {
            let id: u64 = id.parse().ok()?;
            Some(CallbackSpec {
                path: path.clone(),
                function: make_stub(id),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    fn decoded(json: &str) -> CallValue {
        CallValue::from(serde_json::from_str::<serde_json::Value>(json).unwrap())
    }

    #[test]
    fn installs_at_nested_path() {
        let mut tree = decoded(r#"[{"on": "[Function]"}]"#);
        install(
            &mut tree,
            &[PathSeg::index(0), PathSeg::key("on")],
            Function::local(|_| {}),
        );
        assert!(tree.get(&[PathSeg::index(0), PathSeg::key("on")]).unwrap().is_function());
    }

    #[test]
    fn numeric_string_segments_index_sequences() {
        let mut tree = decoded(r#"[["[Function]"]]"#);
        install(
            &mut tree,
            &[PathSeg::key("0"), PathSeg::key("0")],
            Function::local(|_| {}),
        );
        assert!(tree.get(&[PathSeg::index(0), PathSeg::index(0)]).unwrap().is_function());
    }

    #[test]
    fn missing_paths_are_silent() {
        let mut tree = decoded(r#"{"a": 1}"#);
        install(
            &mut tree,
            &[PathSeg::key("b"), PathSeg::key("c")],
            Function::local(|_| {}),
        );
        assert_eq!(tree, decoded(r#"{"a": 1}"#));
    }

    #[test]
    fn unparsable_ids_are_skipped() {
        let mut map = CallbackMap::new();
        map.insert("0".into(), Path::from_segs(vec![PathSeg::index(0)]));
        map.insert("nope".into(), Path::root());

        let specs = specs_from_map(&map, |id| {
            assert_eq!(id, 0);
            Function::local(|_| {})
        });
        assert_eq!(specs.len(), 1);
    }
}
