//! Field tables for nested configuration objects.
//!
//! `reconciled_object!` takes one line per struct field (its kind, wire
//! name and diff rule) and derives both [`Canonicalize`] and [`Compare`]
//! from it. Every struct field must be listed, so adding a field without
//! reconciliation rules fails to compile.
//!
//! Kinds: `string`, `scalar`, `json`, `map`, `list`, `string_list`,
//! `string_set`, `nested`, `nested_list`, `nested_set`.
//!
//! [`Canonicalize`]: crate::planner::canonical::Canonicalize
//! [`Compare`]: crate::planner::Compare

macro_rules! reconciled_object {
    (@alone nested, $d:expr) => {
        $crate::planner::canonical::desired_nested_alone($d)
    };
    (@alone nested_list, $d:expr) => {
        $d.iter()
            .map(|v| $crate::planner::canonical::Canonicalize::canonicalize_desired(v, None))
            .collect()
    };
    (@alone nested_set, $d:expr) => {
        reconciled_object!(@alone nested_list, $d)
    };
    (@alone $kind:ident, $d:expr) => {
        ($d).clone()
    };

    (@desired string, $d:expr, $i:expr) => { $crate::planner::canonical::desired_string($d, $i) };
    (@desired scalar, $d:expr, $i:expr) => { $crate::planner::canonical::desired_scalar($d, $i) };
    (@desired json, $d:expr, $i:expr) => { $crate::planner::canonical::desired_json($d, $i) };
    (@desired map, $d:expr, $i:expr) => { $crate::planner::canonical::desired_map($d, $i) };
    (@desired list, $d:expr, $i:expr) => { $crate::planner::canonical::desired_list($d, $i) };
    (@desired string_list, $d:expr, $i:expr) => { $crate::planner::canonical::desired_string_list($d, $i) };
    (@desired string_set, $d:expr, $i:expr) => { $crate::planner::canonical::desired_string_set($d, $i) };
    (@desired nested, $d:expr, $i:expr) => { $crate::planner::canonical::desired_nested($d, $i) };
    (@desired nested_list, $d:expr, $i:expr) => { $crate::planner::canonical::desired_nested_list($d, $i) };
    (@desired nested_set, $d:expr, $i:expr) => { $crate::planner::canonical::desired_nested_list($d, $i) };

    (@new string, $n:expr, $d:expr) => { $crate::planner::canonical::new_string($n, $d) };
    (@new json, $n:expr, $d:expr) => { $crate::planner::canonical::new_json($n, $d) };
    (@new string_list, $n:expr, $d:expr) => { $crate::planner::canonical::new_string_list($n, $d) };
    (@new string_set, $n:expr, $d:expr) => { $crate::planner::canonical::new_string_set($n, $d) };
    (@new nested, $n:expr, $d:expr) => { $crate::planner::canonical::new_nested($n, $d) };
    (@new nested_list, $n:expr, $d:expr) => { $crate::planner::canonical::new_nested_list($n, $d) };
    (@new nested_set, $n:expr, $d:expr) => { $crate::planner::canonical::new_nested_set($n, $d) };
    (@new $kind:ident, $n:expr, $d:expr) => { ($n).clone() };

    (@diff string, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.string($w, $d, $a, $r) };
    (@diff scalar, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.scalar($w, $d, $a, $r) };
    (@diff json, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.json($w, $d, $a, $r) };
    (@diff map, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.map($w, $d, $a, $r) };
    (@diff list, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.list($w, $d, $a, $r) };
    (@diff string_list, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.list($w, $d, $a, $r) };
    (@diff string_set, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.string_set($w, $d, $a, $r) };
    (@diff nested, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.nested($w, $d, $a, $r) };
    (@diff nested_list, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.nested_list($w, $d, $a, $r) };
    (@diff nested_set, $differ:expr, $w:literal, $d:expr, $a:expr, $r:expr) => { $differ.nested_set($w, $d, $a, $r) };

    ($ty:ident { $($field:ident : $kind:ident $wire:literal => $rule:expr),* $(,)? }) => {
        impl $crate::planner::canonical::Canonicalize for $ty {
            fn canonicalize_desired(desired: &Self, initial: Option<&Self>) -> Self {
                let Some(initial) = initial else {
                    return Self {
                        $($field: reconciled_object!(@alone $kind, &desired.$field),)*
                    };
                };
                Self {
                    $($field: reconciled_object!(@desired $kind, &desired.$field, &initial.$field),)*
                }
            }

            fn canonicalize_new(new: &Self, desired: &Self) -> Self {
                let _ = desired;
                Self {
                    $($field: reconciled_object!(@new $kind, &new.$field, &desired.$field),)*
                }
            }
        }

        impl $crate::planner::Compare for $ty {
            fn compare(desired: &Self, actual: &Self, differ: &mut $crate::planner::Differ) {
                $(reconciled_object!(@diff $kind, differ, $wire, &desired.$field, &actual.$field, $rule);)*
            }
        }
    };
}
