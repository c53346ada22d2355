//! XML plan documents.
//!
//! The root `<plan version="...">` holds `<metadata>`, `<epics>` and
//! `<user_feedback>`. Epics, stories and tasks carry `id` and `status`
//! attributes with `<description>` and `<priority>` children; stories add
//! `<points>` and tasks list `<depends_on>` ids inside `<dependencies>`.
//! Feedback entries are `<feedback id=".." timestamp="..">` elements whose
//! `<message>` text is kept byte for byte.
//!
//! Items may also appear without their wrapper element (`<epic>` directly
//! under `<plan>`), so hand-written plans load either way.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use super::format::{EpicDocument, FeedbackDocument, PlanDocument, StoryDocument, TaskDocument};
use crate::model::PlanMetadata;

const DEFAULT_VERSION: &str = "1.0";

/// Errors from reading an XML plan document.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),

    #[error(transparent)]
    Attribute(#[from] AttrError),

    #[error("expected root element <plan>, found <{0}>")]
    UnexpectedRoot(String),

    #[error("document has no root element")]
    Empty,

    #[error("<{element}> is missing the {attribute:?} attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("<{element}> is missing its <{child}> element")]
    MissingElement {
        element: &'static str,
        child: &'static str,
    },

    #[error("<{element}> is not an integer: {value:?}")]
    InvalidInteger { element: &'static str, value: String },

    #[error("{attribute:?} is not an RFC 3339 timestamp: {value:?}")]
    InvalidTimestamp {
        attribute: &'static str,
        value: String,
    },
}

/// Element tree built from reader events. Text of mixed content is joined.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            attributes.push((key, attr.unescape_value()?.into_owned()));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, element: &'static str, name: &'static str) -> Result<String, XmlError> {
        self.attribute(name)
            .map(str::to_owned)
            .ok_or(XmlError::MissingAttribute {
                element,
                attribute: name,
            })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// `item` children, directly or inside a `wrapper` child.
    fn items<'a>(&'a self, wrapper: &'a str, item: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().flat_map(move |c| {
            let nested: &[Element] = if c.name == wrapper { &c.children } else { &[] };
            std::iter::once(c)
                .filter(move |c| c.name == item)
                .chain(nested.iter().filter(move |n| n.name == item))
        })
    }

    fn integer(&self, element: &'static str, default: i64) -> Result<i64, XmlError> {
        match self.child_text(element) {
            None => Ok(default),
            Some(text) => text.trim().parse().map_err(|_| XmlError::InvalidInteger {
                element,
                value: text.to_owned(),
            }),
        }
    }

    fn timestamp(&self, attribute: &'static str) -> Result<Option<DateTime<Utc>>, XmlError> {
        self.attribute(attribute)
            .map(|value| {
                DateTime::parse_from_rfc3339(value.trim())
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| XmlError::InvalidTimestamp {
                        attribute,
                        value: value.to_owned(),
                    })
            })
            .transpose()
    }
}

fn read_tree(text: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(XmlError::Empty);
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&data.decode().map_err(quick_xml::Error::from)?);
                }
            }
            Event::Eof => return Err(XmlError::Empty),
            _ => {}
        }
    }
}

/// Read an XML plan into its document form.
pub fn from_xml(text: &str) -> Result<PlanDocument, XmlError> {
    let root = read_tree(text)?;
    if root.name != "plan" {
        return Err(XmlError::UnexpectedRoot(root.name));
    }

    let metadata = root
        .child("metadata")
        .map(|m| PlanMetadata {
            model: m.child_text("model").map(str::to_owned),
            provider: m.child_text("provider").map(str::to_owned),
            version: m.child_text("version").map(str::to_owned),
            context: m.child_text("context").map(str::to_owned),
        })
        .unwrap_or_default();

    Ok(PlanDocument {
        version: root
            .attribute("version")
            .unwrap_or(DEFAULT_VERSION)
            .to_owned(),
        metadata,
        epics: root
            .items("epics", "epic")
            .map(epic)
            .collect::<Result<_, _>>()?,
        user_feedback: root
            .items("user_feedback", "feedback")
            .map(feedback)
            .collect::<Result<_, _>>()?,
    })
}

fn description(el: &Element, element: &'static str) -> Result<String, XmlError> {
    el.child_text("description")
        .map(str::to_owned)
        .ok_or(XmlError::MissingElement {
            element,
            child: "description",
        })
}

fn epic(el: &Element) -> Result<EpicDocument, XmlError> {
    Ok(EpicDocument {
        id: el.required("epic", "id")?,
        status: el.required("epic", "status")?,
        description: description(el, "epic")?,
        priority: el.integer("priority", 1)?,
        created_at: el.timestamp("created_at")?,
        updated_at: el.timestamp("updated_at")?,
        stories: el
            .items("stories", "story")
            .map(story)
            .collect::<Result<_, _>>()?,
    })
}

fn story(el: &Element) -> Result<StoryDocument, XmlError> {
    Ok(StoryDocument {
        id: el.required("story", "id")?,
        status: el.required("story", "status")?,
        description: description(el, "story")?,
        priority: el.integer("priority", 1)?,
        points: el.integer("points", 0)?,
        created_at: el.timestamp("created_at")?,
        updated_at: el.timestamp("updated_at")?,
        tasks: el
            .items("tasks", "task")
            .map(task)
            .collect::<Result<_, _>>()?,
    })
}

fn task(el: &Element) -> Result<TaskDocument, XmlError> {
    Ok(TaskDocument {
        id: el.required("task", "id")?,
        status: el.required("task", "status")?,
        description: description(el, "task")?,
        priority: el.integer("priority", 1)?,
        dependencies: el
            .items("dependencies", "depends_on")
            .map(|dep| dep.text.trim().to_owned())
            .filter(|dep| !dep.is_empty())
            .collect(),
        created_at: el.timestamp("created_at")?,
        updated_at: el.timestamp("updated_at")?,
    })
}

fn feedback(el: &Element) -> Result<FeedbackDocument, XmlError> {
    let timestamp = el
        .timestamp("timestamp")?
        .ok_or(XmlError::MissingAttribute {
            element: "feedback",
            attribute: "timestamp",
        })?;
    Ok(FeedbackDocument {
        id: el.required("feedback", "id")?,
        timestamp,
        message: el
            .child_text("message")
            .map(str::to_owned)
            .ok_or(XmlError::MissingElement {
                element: "feedback",
                child: "message",
            })?,
    })
}

// -----------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------

/// Write a plan document as indented XML.
pub fn to_xml(doc: &PlanDocument) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<plan version=\"{}\">", escape_attr(&doc.version));

    if doc.metadata != PlanMetadata::default() {
        out.push_str("  <metadata>\n");
        let fields = [
            ("model", &doc.metadata.model),
            ("provider", &doc.metadata.provider),
            ("version", &doc.metadata.version),
            ("context", &doc.metadata.context),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                text_element(&mut out, 4, name, value);
            }
        }
        out.push_str("  </metadata>\n");
    }

    out.push_str("  <epics>\n");
    for epic in &doc.epics {
        open_entity(&mut out, 4, "epic", &epic.id, &epic.status, epic.created_at, epic.updated_at);
        text_element(&mut out, 6, "description", &epic.description);
        text_element(&mut out, 6, "priority", &epic.priority.to_string());
        out.push_str("      <stories>\n");
        for story in &epic.stories {
            write_story(&mut out, story);
        }
        out.push_str("      </stories>\n");
        out.push_str("    </epic>\n");
    }
    out.push_str("  </epics>\n");

    if !doc.user_feedback.is_empty() {
        out.push_str("  <user_feedback>\n");
        for entry in &doc.user_feedback {
            let _ = writeln!(
                out,
                "    <feedback id=\"{}\" timestamp=\"{}\">",
                escape_attr(&entry.id),
                entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            );
            text_element(&mut out, 6, "message", &entry.message);
            out.push_str("    </feedback>\n");
        }
        out.push_str("  </user_feedback>\n");
    }

    out.push_str("</plan>\n");
    out
}

fn write_story(out: &mut String, story: &StoryDocument) {
    open_entity(out, 8, "story", &story.id, &story.status, story.created_at, story.updated_at);
    text_element(out, 10, "description", &story.description);
    text_element(out, 10, "priority", &story.priority.to_string());
    text_element(out, 10, "points", &story.points.to_string());
    out.push_str("          <tasks>\n");
    for task in &story.tasks {
        open_entity(out, 12, "task", &task.id, &task.status, task.created_at, task.updated_at);
        text_element(out, 14, "description", &task.description);
        text_element(out, 14, "priority", &task.priority.to_string());
        if !task.dependencies.is_empty() {
            out.push_str("              <dependencies>\n");
            for dep in &task.dependencies {
                text_element(out, 16, "depends_on", dep);
            }
            out.push_str("              </dependencies>\n");
        }
        out.push_str("            </task>\n");
    }
    out.push_str("          </tasks>\n");
    out.push_str("        </story>\n");
}

fn open_entity(
    out: &mut String,
    indent: usize,
    name: &str,
    id: &str,
    status: &str,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
) {
    let _ = write!(
        out,
        "{:indent$}<{name} id=\"{}\" status=\"{}\"",
        "",
        escape_attr(id),
        escape_attr(status)
    );
    for (attribute, value) in [("created_at", created_at), ("updated_at", updated_at)] {
        if let Some(value) = value {
            let _ = write!(
                out,
                " {attribute}=\"{}\"",
                value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            );
        }
    }
    out.push_str(">\n");
}

fn text_element(out: &mut String, indent: usize, name: &str, text: &str) {
    let _ = writeln!(out, "{:indent$}<{name}>{}</{name}>", "", escape_text(text));
}

/// Escape markup characters. Carriage returns become character references
/// so they survive line-ending normalization.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in escape_text(value).chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plan version="2.0">
  <metadata>
    <model>planner</model>
  </metadata>
  <epics>
    <epic id="epic1" status="in_progress">
      <description>Core engine</description>
      <priority>1</priority>
      <stories>
        <story id="story1" status="in_progress">
          <description>Parse plans</description>
          <priority>2</priority>
          <points>5</points>
          <tasks>
            <task id="task1" status="complete">
              <description>Write the parser</description>
              <priority>1</priority>
            </task>
            <task id="task2" status="pending" created_at="2024-02-13T10:00:00Z">
              <description>Wire &amp; test</description>
              <priority>2</priority>
              <dependencies>
                <depends_on>task1</depends_on>
              </dependencies>
            </task>
          </tasks>
        </story>
      </stories>
    </epic>
  </epics>
  <user_feedback>
    <feedback id="FB-1" timestamp="2024-02-13T09:00:00Z">
      <message>
  Build a plan engine.
</message>
    </feedback>
  </user_feedback>
</plan>
"#;

    #[test]
    fn reads_nested_document() {
        let doc = from_xml(SAMPLE).unwrap();
        assert_eq!(doc.version, "2.0");
        assert_eq!(doc.metadata.model.as_deref(), Some("planner"));
        let story = &doc.epics[0].stories[0];
        assert_eq!(story.points, 5);
        assert_eq!(story.tasks[1].description, "Wire & test");
        assert_eq!(story.tasks[1].dependencies, ["task1"]);
        assert_eq!(
            story.tasks[1].created_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 13, 10, 0, 0).unwrap())
        );
        assert_eq!(doc.user_feedback[0].message, "\n  Build a plan engine.\n");
    }

    #[test]
    fn items_load_without_wrappers() {
        let text = r#"<plan>
  <epic id="e1" status="pending">
    <description>Epic</description>
    <story id="s1" status="pending">
      <description>Story</description>
      <task id="t1" status="pending"><description>Task</description></task>
      <task id="t2" status="pending">
        <description>Task</description>
        <depends_on>t1</depends_on>
      </task>
    </story>
  </epic>
</plan>"#;
        let doc = from_xml(text).unwrap();
        assert_eq!(doc.version, DEFAULT_VERSION);
        let story = &doc.epics[0].stories[0];
        assert_eq!(story.priority, 1);
        assert_eq!(story.points, 0);
        assert_eq!(story.tasks[1].dependencies, ["t1"]);
    }

    #[test]
    fn written_document_reads_back() {
        let mut doc = from_xml(SAMPLE).unwrap();
        doc.user_feedback[0].message = "quote \" and <tag>\r\nkeep  spaces\n".into();
        doc.epics[0].id = "epic\"1".into();

        let text = to_xml(&doc);
        assert!(text.contains("<depends_on>task1</depends_on>"), "got:\n{text}");
        assert!(text.contains("&lt;tag&gt;&#13;\n"), "got:\n{text}");
        assert_eq!(from_xml(&text).unwrap(), doc);
    }

    #[test]
    fn reports_shape_errors() {
        let err = from_xml("<epics/>").unwrap_err();
        assert!(matches!(err, XmlError::UnexpectedRoot(ref name) if name == "epics"), "got: {err}");

        let missing = SAMPLE.replace(" status=\"complete\"", "");
        let err = from_xml(&missing).unwrap_err();
        assert!(
            matches!(err, XmlError::MissingAttribute { element: "task", attribute: "status" }),
            "got: {err}"
        );

        let bad = SAMPLE.replace("<points>5</points>", "<points>five</points>");
        let err = from_xml(&bad).unwrap_err();
        assert!(matches!(err, XmlError::InvalidInteger { element: "points", .. }), "got: {err}");

        let err = from_xml("<plan><epics></plan>").unwrap_err();
        assert!(matches!(err, XmlError::Syntax(_)), "got: {err}");
    }
}
