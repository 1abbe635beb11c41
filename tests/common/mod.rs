#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const FIELDS_YAML: &str = r##"
Year:
  tags: "#date+year"
ISO3CoO:
  name: Country of Origin Code
  tags: "#country+code+origin"
  encoding:
    name: Country of Origin Region
    tags: "#region+origin"
    map:
      AFG: Asia
      SYR: Middle East
ISO3CoA:
  name: Country of Asylum Code
  tags: "#country+code+asylum"
CoO_name:
  name: Country of Origin Name
  tags: "#country+name+origin"
CoA_name:
  name: Country of Asylum Name
  tags: "#country+name+asylum"
REF:
  name: Refugees under UNHCR's mandate
  tags: "#affected+refugees"
ASY:
  name: Asylum-seekers
  tags: "#affected+asylum"
"##;

pub const POPULATION_CSV: &str = "\
Year,ISO3CoO,ISO3CoA,REF,ASY,IDP,STA
2021,AFG,PAK,1500000,200,,
2022,AFG,PAK,1700000,250,,
2022,SYR,TUR,3500000,4000,,
2022,SYR,SYR,,,6800000,
2022,AFG,IRN,750000,10,,
";

pub const CONFIG_YAML: &str = r##"
latest_year: 2022
countries: countries.csv
resources:
  end_year_population_totals:
    file: population.csv
    originating:
      title: End-year population figures originating from {countryname}
      description: Stock figures for people from {countryname} ({countryiso})
    residing:
      title: End-year population figures residing in {countryname}
      description: Stock figures for people hosted by {countryname} ({countryiso})
"##;

pub const COUNTRIES_CSV: &str = "\
iso3,name
AFG,Afghanistan
IRN,Iran (Islamic Republic of)
PAK,Pakistan
SYR,Syrian Arab Rep.
TUR,Türkiye
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Lays out a complete project (configuration, country names, one
    /// resource) and returns the configuration path.
    pub fn write_project(&self) -> PathBuf {
        self.write("countries.csv", COUNTRIES_CSV);
        self.write("population.csv", POPULATION_CSV);
        let config = format!("{CONFIG_YAML}fields:{}", indent(FIELDS_YAML));
        self.write("project.yml", &config)
    }
}

fn indent(yaml: &str) -> String {
    yaml.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("  {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}
