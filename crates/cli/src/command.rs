//! Command-line parsing.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use objects::{ClassName, ObjectId};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "STOWAGE_CONFIG";

/// Configuration file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "stowage.json";

/// Help text printed when the arguments do not parse.
pub const USAGE: &str = "usage: stowage <command>

commands:
  create <Class> <json-fields>   save a new object and print its id
  fetch  <Class> <objectId>      print an object's fields
  delete <Class> <objectId>      delete an object
  watch  <Class> [json-where]    stream live-query events until Ctrl-C";

/// One invocation of the binary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Save a new object built from `fields`.
    Create {
        /// Class of the new object.
        class_name: ClassName,
        /// Field values, from a JSON object argument.
        fields: Map<String, Value>,
    },
    /// Print one object's fields.
    Fetch {
        /// Class of the object.
        class_name: ClassName,
        /// Id of the object.
        object_id: ObjectId,
    },
    /// Delete one object.
    Delete {
        /// Class of the object.
        class_name: ClassName,
        /// Id of the object.
        object_id: ObjectId,
    },
    /// Stream live-query events for a class.
    Watch {
        /// Class to watch.
        class_name: ClassName,
        /// Constraint document; `{}` when omitted.
        constraints: Value,
    },
}

impl Command {
    /// Parses the arguments following the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["create", class, fields] => {
                let fields = match serde_json::from_str(fields).context("parsing fields")? {
                    Value::Object(map) => map,
                    _ => bail!("fields must be a JSON object"),
                };
                Ok(Self::Create {
                    class_name: class_name(class)?,
                    fields,
                })
            }
            ["fetch", class, id] => Ok(Self::Fetch {
                class_name: class_name(class)?,
                object_id: object_id(id)?,
            }),
            ["delete", class, id] => Ok(Self::Delete {
                class_name: class_name(class)?,
                object_id: object_id(id)?,
            }),
            ["watch", class] => Ok(Self::Watch {
                class_name: class_name(class)?,
                constraints: Value::Object(Map::new()),
            }),
            ["watch", class, constraints] => Ok(Self::Watch {
                class_name: class_name(class)?,
                constraints: serde_json::from_str(constraints).context("parsing constraints")?,
            }),
            _ => bail!("{USAGE}"),
        }
    }
}

fn class_name(value: &str) -> Result<ClassName> {
    ClassName::new(value).context("class name must not be empty")
}

fn object_id(value: &str) -> Result<ObjectId> {
    ObjectId::new(value).context("object id must not be empty")
}
