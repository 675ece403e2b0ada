//! Helpers for rendering intercepted-call payload strings.
//!
//! The instrumentation layer owns the full formatting pipeline; these are
//! the pieces the agent ships so every host renders values the same way:
//! quote escaping, size capping, and the fixed field-tagged payload shape
//! the controller parses:
//!
//! ```text
//! TId:12;objCls:'android.net.URL';mthd:'openConnection';retCls:'void';\
//! params:'java.lang.String' 'http://x';stacktrace:'a.b(C.java:1)->d.e(F.java:2)'
//! ```

/// Character enclosing every rendered value.
pub const VALUE_ENCLOSING_CHAR: char = '\'';

/// Cap on a single rendered value. Values above this are truncated so one
/// oversized parameter cannot eat the transport line and cut off the
/// stack trace behind it.
pub const MAX_VALUE_BYTES: usize = 1024;

/// Suffix appended to a truncated value.
pub const TRUNCATION_MARKER: &str = "_TRUNCATED_TO_1000_CHARS";

const SEPARATOR: &str = ";";
const STACK_FRAME_JOINER: &str = "->";

/// Escape occurrences of the enclosing quote character inside a value.
pub fn escape_enclosing(value: &str) -> String {
    value.replace(VALUE_ENCLOSING_CHAR, "\\'")
}

/// Truncate `value` to [`MAX_VALUE_BYTES`], marking the cut.
pub fn trim_to_log_size(value: &str) -> String {
    if value.len() <= MAX_VALUE_BYTES {
        return value.to_string();
    }
    let budget = MAX_VALUE_BYTES - TRUNCATION_MARKER.len();
    // Back off to a char boundary so the cut never splits a code point.
    let mut cut = budget;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &value[..cut], TRUNCATION_MARKER)
}

/// Render one intercepted call in the fixed field-tagged shape.
///
/// `params` are (type, value) pairs; values are escaped and size-capped
/// here, types are taken verbatim. Stack frames are joined with `->`.
pub fn format_api_call(
    thread_id: u64,
    object_class: &str,
    method: &str,
    return_class: &str,
    params: &[(String, String)],
    stack_frames: &[String],
) -> String {
    let rendered_params: Vec<String> = params
        .iter()
        .map(|(ty, value)| {
            format!(
                "'{ty}' '{}'",
                trim_to_log_size(&escape_enclosing(value))
            )
        })
        .collect();

    format!(
        "TId:{thread_id}{SEPARATOR}objCls:'{object_class}'{SEPARATOR}mthd:'{method}'\
         {SEPARATOR}retCls:'{return_class}'{SEPARATOR}params:{}{SEPARATOR}stacktrace:'{}'",
        rendered_params.join(" "),
        escape_enclosing(&stack_frames.join(STACK_FRAME_JOINER)),
    )
}
