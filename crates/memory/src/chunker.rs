/// Paragraph-packing chunker for free-text content.

/// Separator placed between paragraphs packed into the same chunk.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split `content` into paragraphs. A paragraph is a run of non-blank lines;
/// lines containing only whitespace count as blank.
pub fn paragraphs(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut out);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut out);
    out
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let para = lines.join("\n");
    let para = para.trim();
    if !para.is_empty() {
        out.push(para.to_string());
    }
    lines.clear();
}

/// Pack paragraphs into chunks of at most `max_chunk_chars` characters.
///
/// Paragraphs are accumulated in order until appending the next one (plus the
/// separator) would exceed the bound, at which point the accumulation is
/// emitted as one chunk. A paragraph that is longer than the bound on its own
/// becomes a single oversize chunk; it is never split mid-paragraph.
pub fn chunk(content: &str, max_chunk_chars: usize) -> Vec<String> {
    let sep_len = PARAGRAPH_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for para in paragraphs(content) {
        let para_len = para.chars().count();

        if current.is_empty() {
            current = para;
            current_len = para_len;
            continue;
        }

        if current_len + sep_len + para_len <= max_chunk_chars {
            current.push_str(PARAGRAPH_SEPARATOR);
            current.push_str(&para);
            current_len += sep_len + para_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current = para;
            current_len = para_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
