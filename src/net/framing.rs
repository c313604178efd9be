/// Pops the first complete newline-terminated message off the front of the
/// buffer, stripping the terminator (and a stray carriage return). A
/// trailing segment with no newline is an incomplete message and stays in
/// the buffer untouched, so partial progress survives across receives.
pub fn next_line(buffer: &mut String) -> Option<String> {
    let end = buffer.find('\n')?;
    let mut line: String = buffer.drain(..=end).collect();
    line.pop();
    if line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}
