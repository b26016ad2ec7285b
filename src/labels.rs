use anyhow::Result;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Label list, one label per line; the line number is the class id
///
/// Class `0` is the background entry of the SSD label files. The decoder never formats labels;
/// the list is only kept for the caller that draws the overlay.
///
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Labels {
    labels: Vec<String>,
}

impl From<Vec<String>> for Labels {
    fn from(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl Labels {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let labels = Self::from_reader(File::open(path)?)?;
        debug!("Loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// Reads every line as is, including empty ones, to keep the class ids aligned
    ///
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let labels = BufReader::new(reader)
            .lines()
            .map(|l| l.map(|l| l.trim_end_matches('\r').to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { labels })
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.labels.get(class_id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::labels::Labels;

    #[test]
    fn read_lines() {
        let labels = Labels::from_reader("???\nperson\r\n\nbicycle".as_bytes()).unwrap();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.get(0), Some("???"));
        assert_eq!(labels.get(1), Some("person"));
        assert_eq!(labels.get(2), Some(""));
        assert_eq!(labels.get(3), Some("bicycle"));
        assert_eq!(labels.get(4), None);
    }

    #[test]
    fn from_vec() {
        let labels = Labels::from(vec!["background".to_string(), "face".to_string()]);
        assert_eq!(labels.get(1), Some("face"));
        assert!(!labels.is_empty());
    }
}
