/// Bytes for a line typed into a terminal: the text followed by a carriage return.
/// With `use_bracketed_paste` the text is wrapped in the bracketed-paste markers
/// so interactive line editors take it verbatim.
pub fn build_submission_payload(data: &[u8], use_bracketed_paste: bool) -> Vec<u8> {
    let bracket_overhead = if use_bracketed_paste { 12 } else { 0 };
    let mut payload = Vec::with_capacity(data.len() + bracket_overhead + 1);

    if use_bracketed_paste {
        payload.extend_from_slice(b"\x1b[200~");
    }
    payload.extend_from_slice(data);
    if use_bracketed_paste {
        payload.extend_from_slice(b"\x1b[201~");
    }
    payload.push(b'\r');
    payload
}
