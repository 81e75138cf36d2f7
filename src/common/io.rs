//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path).map(BufReader::new)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Transparently open a file with gzip encoder.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        let file = File::create(path)?;
        let bufwriter = BufWriter::new(file);
        let encoder = GzEncoder::new(bufwriter, Compression::default());
        Ok(Box::new(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        let file = File::create(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("lines.txt")]
    #[case("lines.txt.gz")]
    fn write_then_read_roundtrip(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join(filename);

        {
            let mut f = super::open_write_maybe_gz(&path)?;
            f.write_all(b"hello\nworld\n")?;
            f.flush()?;
        }

        let mut f = super::open_read_maybe_gz(&path)?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        assert_eq!(buf, "hello\nworld\n");

        Ok(())
    }
}
