use std::{
    collections::HashMap,
    fmt, fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

use crate::error::ModelLoadError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelBundle {
    FaceDetector,
    FaceLandmark68,
    FaceExpression,
}

impl ModelBundle {
    pub fn name(&self) -> &'static str {
        match self {
            ModelBundle::FaceDetector => "face_detector",
            ModelBundle::FaceLandmark68 => "face_landmark_68",
            ModelBundle::FaceExpression => "face_expression",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.name())
    }
}

impl fmt::Display for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where bundles come from, decided by the shape of the configured base path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    Remote(String),
    Directory(PathBuf),
}

impl ModelSource {
    pub fn parse(base: &str) -> Self {
        if base.starts_with("http://") || base.starts_with("https://") {
            ModelSource::Remote(base.trim_end_matches('/').to_string())
        } else {
            ModelSource::Directory(PathBuf::from(base))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelLoadEvent {
    AlreadyPresent {
        bundle: ModelBundle,
    },
    Started {
        bundle: ModelBundle,
        total: Option<u64>,
    },
    Progress {
        bundle: ModelBundle,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        bundle: ModelBundle,
    },
}

pub trait ModelStore {
    /// Makes `bundle` available on the local filesystem and returns its path.
    fn fetch(
        &self,
        bundle: ModelBundle,
        on_event: &mut dyn FnMut(ModelLoadEvent),
    ) -> Result<PathBuf, ModelLoadError>;
}

#[derive(Clone, Debug, Default)]
pub struct ModelSet {
    paths: HashMap<ModelBundle, PathBuf>,
}

impl ModelSet {
    pub fn get(&self, bundle: ModelBundle) -> Option<&Path> {
        self.paths.get(&bundle).map(PathBuf::as_path)
    }

    pub fn require(&self, bundle: ModelBundle) -> Result<&Path, ModelLoadError> {
        self.get(bundle).ok_or_else(|| ModelLoadError::Missing {
            bundle,
            path: PathBuf::from(bundle.file_name()),
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Fetches every bundle; the first failure aborts the whole load.
pub fn load_models(
    store: &dyn ModelStore,
    bundles: &[ModelBundle],
    on_event: &mut dyn FnMut(ModelLoadEvent),
) -> Result<ModelSet, ModelLoadError> {
    let mut set = ModelSet::default();
    for &bundle in bundles {
        let path = store.fetch(bundle, on_event)?;
        log::info!("model {bundle} ready at {}", path.display());
        set.paths.insert(bundle, path);
    }
    Ok(set)
}

pub fn store_for(source: &ModelSource, cache_dir: &Path) -> Box<dyn ModelStore + Send> {
    match source {
        ModelSource::Remote(prefix) => Box::new(HttpModelStore::new(prefix.clone(), cache_dir)),
        ModelSource::Directory(dir) => Box::new(DirModelStore::new(dir.clone())),
    }
}

#[derive(Clone, Debug)]
pub struct DirModelStore {
    dir: PathBuf,
}

impl DirModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModelStore for DirModelStore {
    fn fetch(
        &self,
        bundle: ModelBundle,
        on_event: &mut dyn FnMut(ModelLoadEvent),
    ) -> Result<PathBuf, ModelLoadError> {
        let path = self.dir.join(bundle.file_name());
        if !path.is_file() {
            return Err(ModelLoadError::Missing { bundle, path });
        }
        on_event(ModelLoadEvent::AlreadyPresent { bundle });
        on_event(ModelLoadEvent::Finished { bundle });
        Ok(path)
    }
}

/// Downloads `<prefix>/<file_name>` into a cache directory, once.
#[derive(Clone, Debug)]
pub struct HttpModelStore {
    prefix: String,
    cache_dir: PathBuf,
    client: Client,
}

impl HttpModelStore {
    pub fn new(prefix: impl Into<String>, cache_dir: &Path) -> Self {
        Self {
            prefix: prefix.into(),
            cache_dir: cache_dir.to_path_buf(),
            client: Client::new(),
        }
    }

    pub fn url_for(&self, bundle: ModelBundle) -> String {
        format!(
            "{}/{}",
            self.prefix.trim_end_matches('/'),
            bundle.file_name()
        )
    }

    fn download(
        &self,
        bundle: ModelBundle,
        dest: &Path,
        on_event: &mut dyn FnMut(ModelLoadEvent),
    ) -> Result<(), ModelLoadError> {
        let url = self.url_for(bundle);
        log::info!("downloading model {bundle} from {url} to {}", dest.display());

        let download_err = |source| ModelLoadError::Download {
            bundle,
            url: url.clone(),
            source,
        };
        let io_err = |path: &Path, source| ModelLoadError::Io {
            bundle,
            path: path.to_path_buf(),
            source,
        };

        let mut response = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?;

        let total = response.content_length();
        on_event(ModelLoadEvent::Started { bundle, total });
        let progress = create_progress_bar(total);

        let tmp_path = dest.with_extension("download");
        let mut file = fs::File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; 16 * 1024];
        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| io_err(&tmp_path, e))?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])
                .map_err(|e| io_err(&tmp_path, e))?;
            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
            on_event(ModelLoadEvent::Progress {
                bundle,
                downloaded,
                total,
            });
        }

        file.sync_all().map_err(|e| io_err(&tmp_path, e))?;
        fs::rename(&tmp_path, dest).map_err(|e| io_err(dest, e))?;
        progress.finish_with_message(format!("{bundle} ready"));

        on_event(ModelLoadEvent::Finished { bundle });
        Ok(())
    }
}

impl ModelStore for HttpModelStore {
    fn fetch(
        &self,
        bundle: ModelBundle,
        on_event: &mut dyn FnMut(ModelLoadEvent),
    ) -> Result<PathBuf, ModelLoadError> {
        let dest = self.cache_dir.join(bundle.file_name());
        if dest.is_file() {
            on_event(ModelLoadEvent::AlreadyPresent { bundle });
            on_event(ModelLoadEvent::Finished { bundle });
            return Ok(dest);
        }

        fs::create_dir_all(&self.cache_dir).map_err(|source| ModelLoadError::Io {
            bundle,
            path: self.cache_dir.clone(),
            source,
        })?;
        self.download(bundle, &dest, on_event)?;
        Ok(dest)
    }
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} downloading model")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}
