//! Reading and writing of Hamiltonian integrals in the FCIDUMP format.
//!
//! An FCIDUMP file starts with a namelist header such as
//! ```text
//!  &FCI NORB=6,NELEC=6,MS2=0,
//!   ORBSYM=1,1,1,1,1,1,
//!   ISYM=1,
//!  &END
//! ```
//! followed by lines `value i j k l` with one-based orbital indices. Lines with all four indices
//! non-zero give two-electron integrals `(ij|kl)`, lines with `k = l = 0` give one-electron
//! integrals `h_ij`, and the line with all indices zero gives the nuclear repulsion energy. Only
//! one of each set of permutationally equivalent integrals needs to be present.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{self, ensure, format_err};
use lazy_static::lazy_static;
use ndarray::{Array2, Array4};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::integrals::HamiltonianIntegrals;

/// Magnitude below which integrals are omitted when writing FCIDUMP files.
const FCIDUMP_WRITE_THRESHOLD: f64 = 1e-14;

lazy_static! {
    static ref NORB_RE: Regex = Regex::new(r"(?i)\bNORB\s*=\s*(\d+)").expect("Regex pattern invalid.");
    static ref NELEC_RE: Regex =
        Regex::new(r"(?i)\bNELEC\s*=\s*(\d+)").expect("Regex pattern invalid.");
    static ref MS2_RE: Regex = Regex::new(r"(?i)\bMS2\s*=\s*(-?\d+)").expect("Regex pattern invalid.");
    static ref END_RE: Regex = Regex::new(r"(?i)(&END|/)\s*$").expect("Regex pattern invalid.");
}

/// Electron-count information carried in an FCIDUMP header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcidumpHeader {
    /// The number of spatial orbitals.
    pub norb: usize,

    /// The total number of electrons.
    pub nelec: usize,

    /// Twice the spin projection, `n_up − n_dn`.
    pub ms2: i64,
}

impl FcidumpHeader {
    /// The numbers of α and β electrons implied by this header.
    pub fn electron_counts(&self) -> Result<(usize, usize), anyhow::Error> {
        let nelec = i64::try_from(self.nelec)?;
        ensure!(
            (nelec + self.ms2) % 2 == 0 && self.ms2.abs() <= nelec,
            "Inconsistent NELEC = {} and MS2 = {} in FCIDUMP header.",
            self.nelec,
            self.ms2
        );
        let n_up = usize::try_from((nelec + self.ms2) / 2)?;
        let n_dn = usize::try_from((nelec - self.ms2) / 2)?;
        Ok((n_up, n_dn))
    }
}

impl HamiltonianIntegrals {
    /// Reads Hamiltonian integrals from an FCIDUMP file.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the FCIDUMP file.
    ///
    /// # Returns
    ///
    /// The integrals and the header information.
    pub fn from_fcidump<P: AsRef<Path>>(
        path: P,
    ) -> Result<(Self, FcidumpHeader), anyhow::Error> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|err| {
            format_err!(
                "Unable to read FCIDUMP file `{}`: {err}",
                path.as_ref().display()
            )
        })?;
        parse_fcidump(&contents)
    }
}

impl HamiltonianIntegrals {
    /// Writes these integrals in the FCIDUMP format to a formatter sink.
    ///
    /// Only one integral of every set of permutationally equivalent integrals is written, and
    /// integrals with magnitudes below `1e-14` are omitted.
    ///
    /// # Arguments
    ///
    /// * `out` - The sink receiving the FCIDUMP contents.
    /// * `nelec` - The total number of electrons.
    /// * `ms2` - Twice the spin projection, `n_up − n_dn`.
    pub fn write_fcidump<W: fmt::Write>(&self, out: &mut W, nelec: usize, ms2: i64) -> fmt::Result {
        let norb = self.norb();
        writeln!(out, " &FCI NORB={norb},NELEC={nelec},MS2={ms2},")?;
        writeln!(out, "  ORBSYM={}", "1,".repeat(norb))?;
        writeln!(out, "  ISYM=1,")?;
        writeln!(out, " &END")?;
        let pairs = (0..norb)
            .flat_map(|i| (0..=i).map(move |j| (i, j)))
            .collect::<Vec<_>>();
        for (ij, &(i, j)) in pairs.iter().enumerate() {
            for &(k, l) in pairs[..=ij].iter() {
                write_integral_line(out, self.twoe[(i, j, k, l)], [i + 1, j + 1, k + 1, l + 1])?;
            }
        }
        for &(i, j) in pairs.iter() {
            write_integral_line(out, self.onee[(i, j)], [i + 1, j + 1, 0, 0])?;
        }
        writeln!(out, "{:>24.16e} {:>3} {:>3} {:>3} {:>3}", self.enuc, 0, 0, 0, 0)
    }

    /// Formats these integrals as the contents of an FCIDUMP file.
    ///
    /// # Arguments
    ///
    /// * `nelec` - The total number of electrons.
    /// * `ms2` - Twice the spin projection, `n_up − n_dn`.
    pub fn to_fcidump_string(&self, nelec: usize, ms2: i64) -> Result<String, anyhow::Error> {
        let mut out = String::new();
        self.write_fcidump(&mut out, nelec, ms2)
            .map_err(|err| format_err!("Unable to format FCIDUMP contents: {err}"))?;
        Ok(out)
    }

    /// Writes these integrals to an FCIDUMP file.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the FCIDUMP file.
    /// * `nelec` - The total number of electrons.
    /// * `ms2` - Twice the spin projection, `n_up − n_dn`.
    pub fn to_fcidump<P: AsRef<Path>>(
        &self,
        path: P,
        nelec: usize,
        ms2: i64,
    ) -> Result<(), anyhow::Error> {
        fs::write(path.as_ref(), self.to_fcidump_string(nelec, ms2)?).map_err(|err| {
            format_err!(
                "Unable to write FCIDUMP file `{}`: {err}",
                path.as_ref().display()
            )
        })
    }
}

/// Writes one `value i j k l` line, skipping integrals below the write threshold.
fn write_integral_line<W: fmt::Write>(out: &mut W, value: f64, indices: [usize; 4]) -> fmt::Result {
    if value.abs() < FCIDUMP_WRITE_THRESHOLD {
        return Ok(());
    }
    let [i, j, k, l] = indices;
    writeln!(out, "{value:>24.16e} {i:>3} {j:>3} {k:>3} {l:>3}")
}

/// Parses the contents of an FCIDUMP file.
pub fn parse_fcidump(contents: &str) -> Result<(HamiltonianIntegrals, FcidumpHeader), anyhow::Error> {
    let lines = contents.lines().collect::<Vec<_>>();
    let header_end = lines
        .iter()
        .position(|line| END_RE.is_match(line.trim()))
        .ok_or_else(|| format_err!("Unable to locate the end of the FCIDUMP header."))?;
    let header_text = lines[..=header_end].join(" ");

    let capture = |re: &Regex, key: &str| -> Result<String, anyhow::Error> {
        re.captures(&header_text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| format_err!("Unable to find `{key}` in the FCIDUMP header."))
    };
    let norb = capture(&NORB_RE, "NORB")?.parse::<usize>()?;
    let nelec = capture(&NELEC_RE, "NELEC")?.parse::<usize>()?;
    let ms2 = match capture(&MS2_RE, "MS2") {
        Ok(ms2) => ms2.parse::<i64>()?,
        Err(_) => 0,
    };
    ensure!(norb > 0, "FCIDUMP header declares zero orbitals.");

    let mut enuc = 0.0;
    let mut onee = Array2::<f64>::zeros((norb, norb));
    let mut twoe = Array4::<f64>::zeros((norb, norb, norb, norb));
    for (lineno, line) in lines.iter().enumerate().skip(header_end + 1) {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.is_empty() {
            continue;
        }
        ensure!(
            fields.len() == 5,
            "Malformed FCIDUMP line {}: `{line}`.",
            lineno + 1
        );
        let value = fields[0].replace(['D', 'd'], "E").parse::<f64>()?;
        let idx = fields[1..]
            .iter()
            .map(|s| s.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            idx.iter().all(|&i| i <= norb),
            "FCIDUMP line {} has an orbital index beyond NORB = {norb}.",
            lineno + 1
        );
        match (idx[0], idx[1], idx[2], idx[3]) {
            (0, 0, 0, 0) => enuc = value,
            (i, j, 0, 0) if i > 0 && j > 0 => {
                onee[(i - 1, j - 1)] = value;
                onee[(j - 1, i - 1)] = value;
            }
            (i, j, k, l) if i > 0 && j > 0 && k > 0 && l > 0 => {
                let (i, j, k, l) = (i - 1, j - 1, k - 1, l - 1);
                [
                    (i, j, k, l),
                    (j, i, k, l),
                    (i, j, l, k),
                    (j, i, l, k),
                    (k, l, i, j),
                    (l, k, i, j),
                    (k, l, j, i),
                    (l, k, j, i),
                ]
                .into_iter()
                .for_each(|ix| twoe[ix] = value);
            }
            // Orbital energies (i 0 0 0) are not needed.
            _ => {}
        }
    }
    log::debug!("Read FCIDUMP integrals over {norb} orbitals with {nelec} electrons.");

    let integrals = HamiltonianIntegrals::builder()
        .enuc(enuc)
        .onee(onee)
        .twoe(twoe)
        .build()
        .map_err(|err| format_err!(err))?;
    Ok((integrals, FcidumpHeader { norb, nelec, ms2 }))
}
