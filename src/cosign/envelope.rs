//
// Copyright 2025 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! DSSE envelopes read from local attestation files.
//!
//! An attestation file holds one or more JSON envelopes written one after the
//! other (not a JSON array). [`EnvelopeStream`] decodes them lazily, one
//! document at a time.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;

use crate::errors::{Result, SigstoreError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeSignature {
    #[serde(default)]
    pub keyid: String,
    pub sig: String,
}

/// A DSSE envelope
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    #[serde(
        rename = "payloadType",
        default,
        deserialize_with = "null_as_default"
    )]
    pub payload_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub signatures: Vec<EnvelopeSignature>,
}

/// Treat an explicit JSON `null` like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

type Documents = StreamDeserializer<'static, IoRead<BufReader<File>>, Envelope>;

/// Lazy sequence of the envelopes stored inside of a file.
///
/// The sequence ends after the last document, or right after the first
/// document that cannot be decoded. Call [`EnvelopeStream::restart`] to
/// read the file again from its beginning.
pub struct EnvelopeStream {
    path: PathBuf,
    documents: Documents,
    document: usize,
    done: bool,
}

impl EnvelopeStream {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let documents = Self::documents(&path)?;
        Ok(EnvelopeStream {
            path,
            documents,
            document: 0,
            done: false,
        })
    }

    fn documents(path: &Path) -> Result<Documents> {
        let file = File::open(path).map_err(|source| SigstoreError::ReadFileError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter())
    }

    /// Rewind to the first document
    pub fn restart(&mut self) -> Result<()> {
        self.documents = Self::documents(&self.path)?;
        self.document = 0;
        self.done = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the document the next call to `next` is going to return
    pub fn position(&self) -> usize {
        self.document
    }
}

impl Iterator for EnvelopeStream {
    type Item = Result<Envelope>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.documents.next()? {
            Ok(envelope) => Ok(envelope),
            Err(e) if e.is_io() => {
                self.done = true;
                Err(SigstoreError::ReadFileError {
                    path: self.path.clone(),
                    source: e.into(),
                })
            }
            Err(e) => {
                self.done = true;
                Err(SigstoreError::MalformedEnvelope {
                    path: self.path.clone(),
                    document: self.document,
                    reason: e.to_string(),
                })
            }
        };
        self.document += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const FIRST: &str = r#"{"payloadType":"application/vnd.in-toto+json","payload":"e30=","signatures":[{"keyid":"k1","sig":"c2ln"}]}"#;
    const SECOND: &str = r#"{"payloadType":"application/vnd.in-toto+json","payload":"e30=","signatures":[]}"#;

    #[test]
    fn concatenated_documents() {
        let file = file_with(&format!("{FIRST}\n{SECOND}{FIRST}"));
        let envelopes: Vec<Envelope> = EnvelopeStream::open(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .expect("cannot decode");

        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[0].signatures[0].keyid, "k1");
        assert!(envelopes[1].signatures.is_empty());
        assert_eq!(envelopes[0], envelopes[2]);
    }

    #[test]
    fn null_fields_decode_as_missing() {
        let file = file_with(r#"{"payloadType":null,"payload":null,"signatures":null} {}"#);
        let envelopes: Vec<Envelope> = EnvelopeStream::open(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .expect("cannot decode");

        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0], envelopes[1]);
        assert!(envelopes[0].signatures.is_empty());
        assert!(envelopes[0].payload_type.is_empty());
    }

    #[test]
    fn empty_file_has_no_documents() {
        let file = file_with("  \n");
        assert_eq!(EnvelopeStream::open(file.path()).unwrap().count(), 0);
    }

    #[test]
    fn stops_at_first_malformed_document() {
        let file = file_with(&format!("{FIRST} {{\"payloadType\": 42}} {FIRST}"));
        let mut stream = EnvelopeStream::open(file.path()).unwrap();

        assert!(stream.next().unwrap().is_ok());
        match stream.next().unwrap() {
            Err(SigstoreError::MalformedEnvelope { document, path, .. }) => {
                assert_eq!(document, 1);
                assert_eq!(path, file.path());
            }
            other => panic!("unexpected item {other:?}"),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn restart_reads_again() {
        let file = file_with(&format!("{FIRST}{SECOND}"));
        let mut stream = EnvelopeStream::open(file.path()).unwrap();
        assert_eq!(stream.by_ref().count(), 2);
        assert_eq!(stream.position(), 2);

        stream.restart().unwrap();
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.count(), 2);
    }

    #[test]
    fn missing_file() {
        let err = EnvelopeStream::open("/does/not/exist.intoto.jsonl")
            .err()
            .expect("open should fail");
        assert!(matches!(err, SigstoreError::ReadFileError { .. }));
    }

    #[test]
    fn serialized_form_uses_dsse_field_names() {
        let envelope: Envelope = serde_json::from_str(FIRST).unwrap();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["payloadType"], "application/vnd.in-toto+json");
        assert_eq!(value["signatures"][0]["sig"], "c2ln");
    }
}
