use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::OutputFormat;
use crate::error::{Error, Result};
use crate::sample::Sample;

/// Somewhere samples go.
pub trait SampleSink {
    fn write_sample(&mut self, sample: &Sample) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

impl<T: SampleSink + ?Sized> SampleSink for Box<T> {
    fn write_sample(&mut self, sample: &Sample) -> io::Result<()> {
        (**self).write_sample(sample)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// `time = 0.123, x = 0.001, y = -0.010, z = 0.998`
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> TextSink<W> {
        TextSink { out }
    }
}

impl<W: Write> SampleSink for TextSink<W> {
    fn write_sample(&mut self, s: &Sample) -> io::Result<()> {
        writeln!(
            self.out,
            "time = {:.3}, x = {:.3}, y = {:.3}, z = {:.3}",
            s.time, s.x, s.y, s.z
        )
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// `time,x,y,z` header followed by one row per sample.
pub struct CsvSink<W: Write> {
    out: W,
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut out: W) -> io::Result<CsvSink<W>> {
        writeln!(out, "time,x,y,z")?;
        Ok(CsvSink { out })
    }
}

impl<W: Write> SampleSink for CsvSink<W> {
    fn write_sample(&mut self, s: &Sample) -> io::Result<()> {
        writeln!(self.out, "{:.3},{:.3},{:.3},{:.3}", s.time, s.x, s.y, s.z)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// One JSON object per line.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> JsonSink<W> {
        JsonSink { out }
    }
}

impl<W: Write> SampleSink for JsonSink<W> {
    fn write_sample(&mut self, s: &Sample) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, s)?;
        self.out.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Creates the CSV file, or falls back to stdout in the chosen format.
pub fn open(save: Option<&Path>, format: OutputFormat) -> Result<Box<dyn SampleSink>> {
    if let Some(path) = save {
        let output_err = |source| Error::OutputFile {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(output_err)?;
        let sink = CsvSink::new(BufWriter::new(file)).map_err(output_err)?;
        return Ok(Box::new(sink));
    }
    let stdout = io::stdout();
    let sink: Box<dyn SampleSink> = match format {
        OutputFormat::Text => Box::new(TextSink::new(stdout)),
        OutputFormat::Csv => Box::new(CsvSink::new(stdout).map_err(Error::Output)?),
        OutputFormat::Json => Box::new(JsonSink::new(stdout)),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            time: 0.1234,
            x: 0.001,
            y: -0.01,
            z: 0.998,
        }
    }

    #[test]
    fn text_format() {
        let mut out = Vec::new();
        TextSink::new(&mut out).write_sample(&sample()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "time = 0.123, x = 0.001, y = -0.010, z = 0.998\n"
        );
    }

    #[test]
    fn csv_format() {
        let mut out = Vec::new();
        {
            let mut sink = CsvSink::new(&mut out).unwrap();
            sink.write_sample(&sample()).unwrap();
            sink.finish().unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "time,x,y,z\n0.123,0.001,-0.010,0.998\n"
        );
    }

    #[test]
    fn json_lines() {
        let mut out = Vec::new();
        {
            let mut sink = JsonSink::new(&mut out);
            sink.write_sample(&sample()).unwrap();
            sink.write_sample(&sample()).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["time"], 0.1234);
        assert!((value["z"].as_f64().unwrap() - 0.998).abs() < 1e-6);
    }

    #[test]
    fn csv_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        {
            let mut sink = open(Some(&path), OutputFormat::Text).unwrap();
            sink.write_sample(&sample()).unwrap();
            sink.finish().unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "time,x,y,z\n0.123,0.001,-0.010,0.998\n");
    }

    #[test]
    fn unwritable_csv_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = open(Some(&path), OutputFormat::Text).err().unwrap();
        assert!(matches!(err, Error::OutputFile { .. }));
        assert_eq!(err.exit_code(), 6);
    }
}
