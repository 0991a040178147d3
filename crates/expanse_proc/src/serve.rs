//! Worker-side request loop, run inside the helper process.

use std::io::{self, Read, Write};

use crate::protocol::{read_frame, write_frame, RequestFrame, ResponseBody, ResponseFrame};

/// Answers requests from `input` on `output` until the input stream ends.
///
/// `handler` receives each request payload and returns either the serialized
/// expansion or an error message for the user.
pub fn serve<R, W, F>(mut input: R, mut output: W, mut handler: F) -> io::Result<()>
where
    R: Read,
    W: Write,
    F: FnMut(&[u8]) -> Result<Vec<u8>, String>,
{
    while let Some(request) = read_frame::<_, RequestFrame>(&mut input)? {
        let body = match handler(&request.payload) {
            Ok(bytes) => ResponseBody::Ok(bytes),
            Err(message) => ResponseBody::Err(message),
        };
        write_frame(
            &mut output,
            &ResponseFrame {
                id: request.id,
                body,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn answers_every_request_with_its_id() {
        let mut input = Vec::new();
        write_frame(&mut input, &RequestFrame { id: 4, payload: b"ok".to_vec() }).unwrap();
        write_frame(&mut input, &RequestFrame { id: 5, payload: b"bad".to_vec() }).unwrap();

        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output, |payload| {
            if payload == b"ok" {
                Ok(b"done".to_vec())
            } else {
                Err("rejected".to_string())
            }
        })
        .unwrap();

        let mut cursor = Cursor::new(output);
        let first: ResponseFrame = read_frame(&mut cursor).unwrap().unwrap();
        let second: ResponseFrame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first.id, 4);
        assert_eq!(first.body, ResponseBody::Ok(b"done".to_vec()));
        assert_eq!(second.id, 5);
        assert_eq!(second.body, ResponseBody::Err("rejected".to_string()));
    }

    #[test]
    fn empty_input_ends_cleanly() {
        let mut output = Vec::new();
        serve(Cursor::new(Vec::new()), &mut output, |_| Ok(Vec::new())).unwrap();
        assert!(output.is_empty());
    }
}
