//! Single-file NPZ artifact container.
//!
//! Every pipeline artifact is one `.npz` file: numeric payload as named NPY
//! members plus one `meta.npy` member holding JSON-encoded metadata (channel
//! names, kinds, scalar parameters). Writes are atomic — the container is
//! assembled in a sibling `*.tmp` file and renamed into place once finished,
//! so a failed stage never leaves a partial artifact behind.
//!
//! The member layout per artifact is fixed and versioned by this module
//! alone; stages never touch the container format directly.

use ndarray::{Array, Array1, Array2, Array3, ArrayBase, Data, Dimension};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement, WritableElement};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ArtifactError, CoreError};
use crate::types::{
    Covariance, Epochs, EventList, Evoked, ForwardSolution, HemiSourceSpace, Label, Raw,
    RecordingInfo, SourceEstimate,
};

/// Name of the JSON metadata member inside every artifact.
const META_MEMBER: &str = "meta";

// ---------------------------------------------------------------------------
// Container plumbing
// ---------------------------------------------------------------------------

struct ArtifactWriter {
    npz: NpzWriter<BufWriter<File>>,
    tmp: PathBuf,
    dest: PathBuf,
}

impl ArtifactWriter {
    fn create(dest: &Path) -> Result<Self, ArtifactError> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
            }
        }
        let mut tmp = dest.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let file = File::create(&tmp).map_err(|e| ArtifactError::io(&tmp, e))?;
        Ok(ArtifactWriter {
            npz: NpzWriter::new(BufWriter::new(file)),
            tmp,
            dest: dest.to_path_buf(),
        })
    }

    fn add<S, D>(&mut self, name: &str, array: &ArrayBase<S, D>) -> Result<(), ArtifactError>
    where
        S: Data,
        S::Elem: WritableElement,
        D: Dimension,
    {
        self.npz
            .add_array(name, array)
            .map_err(|e| ArtifactError::npz(&self.dest, e.to_string()))
    }

    fn meta<T: Serialize>(&mut self, meta: &T) -> Result<(), ArtifactError> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| ArtifactError::metadata(&self.dest, e.to_string()))?;
        let arr = Array1::from_vec(bytes);
        self.add(META_MEMBER, &arr)
    }

    fn finish(self) -> Result<(), ArtifactError> {
        self.npz
            .finish()
            .map_err(|e| ArtifactError::npz(&self.dest, e.to_string()))?;
        std::fs::rename(&self.tmp, &self.dest).map_err(|e| ArtifactError::io(&self.dest, e))?;
        debug!("wrote artifact {}", self.dest.display());
        Ok(())
    }
}

struct ArtifactReader {
    npz: NpzReader<BufReader<File>>,
    members: Vec<String>,
    path: PathBuf,
}

impl ArtifactReader {
    fn open(path: &Path) -> Result<Self, ArtifactError> {
        let file = File::open(path).map_err(|e| ArtifactError::io(path, e))?;
        let mut npz = NpzReader::new(BufReader::new(file))
            .map_err(|e| ArtifactError::npz(path, e.to_string()))?;
        let members = npz
            .names()
            .map_err(|e| ArtifactError::npz(path, e.to_string()))?;
        Ok(ArtifactReader { npz, members, path: path.to_path_buf() })
    }

    fn array<T, D>(&mut self, name: &str) -> Result<Array<T, D>, ArtifactError>
    where
        T: ReadableElement,
        D: Dimension,
    {
        // The NPZ layer stores members under their numpy file name
        // (`<name>.npy`); accept either spelling when resolving.
        let with_ext = format!("{name}.npy");
        let stored = if self.members.iter().any(|m| m == name) {
            name.to_string()
        } else if self.members.iter().any(|m| *m == with_ext) {
            with_ext
        } else {
            return Err(ArtifactError::MissingMember {
                path: self.path.clone(),
                member: name.to_string(),
            });
        };
        self.npz
            .by_name(&stored)
            .map_err(|e| ArtifactError::npz(&self.path, format!("member `{stored}`: {e}")))
    }

    fn meta<T: DeserializeOwned>(&mut self) -> Result<T, ArtifactError> {
        let bytes: Array1<u8> = self.array(META_MEMBER)?;
        serde_json::from_slice(bytes.as_slice().unwrap_or(&[]))
            .map_err(|e| ArtifactError::metadata(&self.path, e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Raw recording
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct RawMeta {
    info: RecordingInfo,
}

/// Write a raw recording artifact.
pub fn save_raw(path: &Path, raw: &Raw) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&RawMeta { info: raw.info.clone() })?;
    w.add("data", &raw.data)?;
    w.finish()?;
    Ok(())
}

/// Load a raw recording artifact.
pub fn load_raw(path: &Path) -> Result<Raw, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let meta: RawMeta = r.meta()?;
    let data: Array2<f64> = r.array("data")?;
    Ok(Raw::new(meta.info, data)?)
}

// ---------------------------------------------------------------------------
// Event list
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct EventsMeta {
    sfreq: f64,
}

/// Write an event-list artifact. `sfreq` records the sampling rate the
/// sample indices refer to.
pub fn save_events(path: &Path, events: &EventList, sfreq: f64) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&EventsMeta { sfreq })?;
    w.add("events", &events.events)?;
    w.finish()?;
    Ok(())
}

/// Load an event-list artifact.
pub fn load_events(path: &Path) -> Result<EventList, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let _meta: EventsMeta = r.meta()?;
    let events: Array2<i64> = r.array("events")?;
    Ok(EventList::new(events)?)
}

// ---------------------------------------------------------------------------
// Epochs
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct EpochsMeta {
    info: RecordingInfo,
    tmin: f64,
    sfreq: f64,
}

/// Write an epochs artifact.
pub fn save_epochs(path: &Path, epochs: &Epochs) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&EpochsMeta {
        info: epochs.info.clone(),
        tmin: epochs.tmin,
        sfreq: epochs.sfreq,
    })?;
    w.add("data", &epochs.data)?;
    w.add("events", &epochs.events)?;
    w.finish()?;
    Ok(())
}

/// Load an epochs artifact.
pub fn load_epochs(path: &Path) -> Result<Epochs, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let meta: EpochsMeta = r.meta()?;
    let data: Array3<f64> = r.array("data")?;
    let events: Array2<i64> = r.array("events")?;
    Ok(Epochs::new(meta.info, data, events, meta.tmin, meta.sfreq)?)
}

// ---------------------------------------------------------------------------
// Evoked pair
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct EvokedMeta {
    comments: [String; 2],
    naves: [usize; 2],
    ch_names: Vec<String>,
    tmin: f64,
    sfreq: f64,
}

/// Write the condition-average pair (left, right) as one artifact.
pub fn save_evoked_pair(path: &Path, left: &Evoked, right: &Evoked) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&EvokedMeta {
        comments: [left.comment.clone(), right.comment.clone()],
        naves: [left.nave, right.nave],
        ch_names: left.ch_names.clone(),
        tmin: left.tmin,
        sfreq: left.sfreq,
    })?;
    w.add("left", &left.data)?;
    w.add("right", &right.data)?;
    w.finish()?;
    Ok(())
}

/// Load the condition-average pair.
pub fn load_evoked_pair(path: &Path) -> Result<(Evoked, Evoked), CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let meta: EvokedMeta = r.meta()?;
    let left_data: Array2<f64> = r.array("left")?;
    let right_data: Array2<f64> = r.array("right")?;
    let [left_comment, right_comment] = meta.comments;
    let left = Evoked {
        comment: left_comment,
        nave: meta.naves[0],
        ch_names: meta.ch_names.clone(),
        data: left_data,
        tmin: meta.tmin,
        sfreq: meta.sfreq,
    };
    let right = Evoked {
        comment: right_comment,
        nave: meta.naves[1],
        ch_names: meta.ch_names,
        data: right_data,
        tmin: meta.tmin,
        sfreq: meta.sfreq,
    };
    Ok((left, right))
}

// ---------------------------------------------------------------------------
// Covariance
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct CovMeta {
    names: Vec<String>,
    n_samples: usize,
}

/// Write a covariance artifact.
pub fn save_covariance(path: &Path, cov: &Covariance) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&CovMeta { names: cov.names.clone(), n_samples: cov.n_samples })?;
    w.add("data", &cov.data)?;
    w.finish()?;
    Ok(())
}

/// Load a covariance artifact.
pub fn load_covariance(path: &Path) -> Result<Covariance, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let meta: CovMeta = r.meta()?;
    let data: Array2<f64> = r.array("data")?;
    Ok(Covariance::new(meta.names, data, meta.n_samples)?)
}

// ---------------------------------------------------------------------------
// Forward solution
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct ForwardMeta {
    ch_names: Vec<String>,
    lh_vertices: Vec<u32>,
    rh_vertices: Vec<u32>,
}

fn edges_to_array(edges: &[[u32; 2]]) -> Array2<i64> {
    let mut arr = Array2::<i64>::zeros((edges.len(), 2));
    for (i, e) in edges.iter().enumerate() {
        arr[[i, 0]] = e[0] as i64;
        arr[[i, 1]] = e[1] as i64;
    }
    arr
}

fn array_to_edges(path: &Path, member: &str, arr: &Array2<i64>) -> Result<Vec<[u32; 2]>, ArtifactError> {
    if arr.ncols() != 2 && arr.nrows() != 0 {
        return Err(ArtifactError::shape(
            path,
            member,
            format!("expected 2 columns, got {}", arr.ncols()),
        ));
    }
    Ok((0..arr.nrows())
        .map(|i| [arr[[i, 0]] as u32, arr[[i, 1]] as u32])
        .collect())
}

/// Write a forward-model artifact.
pub fn save_forward(path: &Path, fwd: &ForwardSolution) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&ForwardMeta {
        ch_names: fwd.ch_names.clone(),
        lh_vertices: fwd.lh.vertices.clone(),
        rh_vertices: fwd.rh.vertices.clone(),
    })?;
    w.add("lh_pos", &fwd.lh.positions)?;
    w.add("rh_pos", &fwd.rh.positions)?;
    w.add("lh_edges", &edges_to_array(&fwd.lh.edges))?;
    w.add("rh_edges", &edges_to_array(&fwd.rh.edges))?;
    w.add("gain", &fwd.gain)?;
    w.finish()?;
    Ok(())
}

/// Load a forward-model artifact.
pub fn load_forward(path: &Path) -> Result<ForwardSolution, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let meta: ForwardMeta = r.meta()?;
    let lh_pos: Array2<f64> = r.array("lh_pos")?;
    let rh_pos: Array2<f64> = r.array("rh_pos")?;
    let lh_edges_arr: Array2<i64> = r.array("lh_edges")?;
    let rh_edges_arr: Array2<i64> = r.array("rh_edges")?;
    let gain: Array2<f64> = r.array("gain")?;

    let lh_edges = array_to_edges(path, "lh_edges", &lh_edges_arr)?;
    let rh_edges = array_to_edges(path, "rh_edges", &rh_edges_arr)?;

    let lh = HemiSourceSpace::new(meta.lh_vertices, lh_pos, lh_edges)?;
    let rh = HemiSourceSpace::new(meta.rh_vertices, rh_pos, rh_edges)?;
    Ok(ForwardSolution::new(meta.ch_names, lh, rh, gain)?)
}

// ---------------------------------------------------------------------------
// Source estimate
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct StcMeta {
    lh_vertices: Vec<u32>,
    rh_vertices: Vec<u32>,
    tmin: f64,
    tstep: f64,
}

/// Write a source-estimate artifact.
pub fn save_stc(path: &Path, stc: &SourceEstimate) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(&StcMeta {
        lh_vertices: stc.lh_vertices.clone(),
        rh_vertices: stc.rh_vertices.clone(),
        tmin: stc.tmin,
        tstep: stc.tstep,
    })?;
    w.add("data", &stc.data)?;
    w.finish()?;
    Ok(())
}

/// Load a source-estimate artifact.
pub fn load_stc(path: &Path) -> Result<SourceEstimate, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let meta: StcMeta = r.meta()?;
    let data: Array2<f64> = r.array("data")?;
    Ok(SourceEstimate::new(
        meta.lh_vertices,
        meta.rh_vertices,
        data,
        meta.tmin,
        meta.tstep,
    )?)
}

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// Write a label artifact.
pub fn save_label(path: &Path, label: &Label) -> Result<(), CoreError> {
    let mut w = ArtifactWriter::create(path)?;
    w.meta(label)?;
    w.finish()?;
    Ok(())
}

/// Load a label artifact.
pub fn load_label(path: &Path) -> Result<Label, CoreError> {
    let mut r = ArtifactReader::open(path)?;
    let label: Label = r.meta()?;
    if label.is_empty() {
        return Err(CoreError::Data(crate::error::DataError::Empty {
            what: "label vertex set",
        }));
    }
    Ok(label)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
