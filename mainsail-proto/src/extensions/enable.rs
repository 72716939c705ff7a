//! ENABLE (RFC 5161): the `* ENABLED` confirmation.

use crate::{
    core::{atom, eat_spaces},
    decode::ProtoResult,
    extensions::at_line_end,
};

/// Parse the payload after `ENABLED`: zero or more capability atoms.
pub fn enabled(input: &[u8]) -> ProtoResult<'_, Vec<String>> {
    let mut extensions = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = eat_spaces(remaining)?;
        remaining = rest;
        if at_line_end(remaining) {
            return Ok((remaining, extensions));
        }

        let (rest, name) = atom(remaining)?;
        extensions.push(name.to_owned());
        remaining = rest;
    }
}
