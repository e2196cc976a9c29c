use crate::config::LabelsConfig;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Class names indexed by the model's class id.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    class_labels: Vec<String>,
}

impl Labels {
    pub fn new(class_labels: Vec<String>) -> Self {
        Self { class_labels }
    }

    pub fn from_config(labels_cfg: &LabelsConfig) -> Result<Self, String> {
        load_labels(&labels_cfg.get_path())
            .map(Self::new)
            .map_err(|e| format!("Failed to load labels from {:?}: {}", labels_cfg.get_path(), e))
    }

    /// Ids past the end of the file, or on a blank line, get `class_<id>`.
    pub fn name(&self, class_id: usize) -> String {
        match self.class_labels.get(class_id) {
            Some(label) if !label.is_empty() => label.clone(),
            _ => format!("class_{}", class_id),
        }
    }

    pub fn len(&self) -> usize {
        self.class_labels.len()
    }
}

/// Reads one class name per line; the line index is the class id. Anything
/// after the first comma is ignored, so `person,255,0,0` style files load
/// too. A blank line keeps its id with an empty name. Trailing blank lines
/// are dropped.
pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    read_labels(io::BufReader::new(file))
}

fn read_labels(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.split(',').next().unwrap_or_default().trim();
        labels.push(label.to_string());
    }

    while labels.last().is_some_and(|label| label.is_empty()) {
        labels.pop();
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "labels file contains no class names",
        ));
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_labels_plain_and_colored() {
        let input = "person\nbicycle, 0, 255, 0\n  car  \n\n\n";
        let labels = read_labels(Cursor::new(input)).unwrap();
        assert_eq!(labels, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn test_blank_line_keeps_class_ids() {
        let labels = Labels::new(read_labels(Cursor::new("person\n\ncar\n")).unwrap());
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.name(0), "person");
        assert_eq!(labels.name(1), "class_1");
        assert_eq!(labels.name(2), "car");
    }

    #[test]
    fn test_read_labels_empty_file() {
        assert!(read_labels(Cursor::new("\n\n")).is_err());
    }

    #[test]
    fn test_unknown_class_name() {
        let labels = Labels::new(vec!["person".to_string()]);
        assert_eq!(labels.name(0), "person");
        assert_eq!(labels.name(7), "class_7");
        assert_eq!(labels.len(), 1);
    }
}
