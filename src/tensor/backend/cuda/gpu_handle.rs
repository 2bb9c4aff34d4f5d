use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use cudarc::{
    cublas::CudaBlas,
    curand::CudaRng,
    driver::{CudaDevice, CudaFunction, CudaStream},
    nvrtc::compile_ptx,
};
use log::{debug, info};

use crate::{
    config::GpuConfig,
    tensor::{
        backend::cuda::kernels::{KERNEL_NAMES, KERNEL_SOURCE, MODULE_NAME},
        TensorError,
    },
};

static GPU_CONTEXT: RwLock<Option<Arc<GpuContext>>> = RwLock::new(None);

/// Everything bound by [`GpuHandle::init`]: the device with its loaded kernel
/// module, the cuBLAS and cuRAND handles and the worker streams.
pub struct GpuContext {
    device: Arc<CudaDevice>,
    blas: Mutex<CudaBlas>,
    rng: Mutex<CudaRng>,
    workers: Vec<CudaStream>,
    config: GpuConfig,
}

// SAFETY: the cuBLAS and cuRAND handles are only reached through their
// mutexes, and the driver API is thread-safe for the device and streams.
unsafe impl Send for GpuContext {}
unsafe impl Sync for GpuContext {}

impl GpuContext {
    fn new(config: &GpuConfig) -> Result<Self, TensorError> {
        config.validate()?;
        let device: Arc<CudaDevice> = CudaDevice::new(config.device_ordinal)?;

        let ptx = compile_ptx(KERNEL_SOURCE)?;
        device.load_ptx(ptx, MODULE_NAME, KERNEL_NAMES)?;
        debug!("Loaded {} CUDA kernels", KERNEL_NAMES.len());

        let blas: CudaBlas = CudaBlas::new(device.clone())?;
        let rng: CudaRng = CudaRng::new(config.seed, device.clone())?;
        let workers: Vec<CudaStream> = (0..config.num_workers)
            .map(|_| device.fork_default_stream())
            .collect::<Result<Vec<CudaStream>, _>>()?;

        Ok(Self {
            device,
            blas: Mutex::new(blas),
            rng: Mutex::new(rng),
            workers,
            config: config.clone(),
        })
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    pub fn device_ordinal(&self) -> usize {
        self.config.device_ordinal
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn func(&self, name: &'static str) -> Result<CudaFunction, TensorError> {
        self.device
            .get_func(MODULE_NAME, name)
            .ok_or(TensorError::KernelNotFound(name))
    }

    pub(crate) fn blas(&self) -> Result<MutexGuard<'_, CudaBlas>, TensorError> {
        Ok(self.blas.lock()?)
    }

    pub(crate) fn rng(&self) -> Result<MutexGuard<'_, CudaRng>, TensorError> {
        Ok(self.rng.lock()?)
    }
}

/// Process-wide binding of the accelerator. Nothing on the GPU may be
/// allocated or launched before [`GpuHandle::init`] or after
/// [`GpuHandle::destroy`].
pub struct GpuHandle;

impl GpuHandle {
    /// Binds `device_ordinal`, compiles the kernels and forks `num_workers`
    /// streams.
    ///
    /// Every operation runs on the device's default stream and returns once
    /// its results are visible. The worker streams are reserved for
    /// scheduling independent tensors concurrently and carry no work yet.
    pub fn init(device_ordinal: usize, num_workers: usize) -> Result<(), TensorError> {
        Self::init_with(&GpuConfig::new(device_ordinal, num_workers))
    }

    pub fn init_with(config: &GpuConfig) -> Result<(), TensorError> {
        let mut slot = GPU_CONTEXT.write()?;
        if slot.is_some() {
            return Err(TensorError::GpuAlreadyInitialized);
        }
        let context: GpuContext = GpuContext::new(config)?;
        info!(
            "GPU handle initialized on device {} with {} worker stream(s)",
            config.device_ordinal, config.num_workers
        );
        *slot = Some(Arc::new(context));
        Ok(())
    }

    /// Waits for queued work and releases the handles. Buffers still alive
    /// keep the driver context until they are dropped.
    pub fn destroy() -> Result<(), TensorError> {
        let mut slot = GPU_CONTEXT.write()?;
        let context: Arc<GpuContext> = slot.take().ok_or(TensorError::GpuNotInitialized)?;
        context.device.synchronize()?;
        info!("GPU handle on device {} destroyed", context.device_ordinal());
        Ok(())
    }

    pub fn is_initialized() -> bool {
        GPU_CONTEXT
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn context() -> Result<Arc<GpuContext>, TensorError> {
        GPU_CONTEXT
            .read()?
            .as_ref()
            .cloned()
            .ok_or(TensorError::GpuNotInitialized)
    }

    pub fn device_ordinal() -> Result<usize, TensorError> {
        Ok(Self::context()?.device_ordinal())
    }

    pub fn num_workers() -> Result<usize, TensorError> {
        Ok(Self::context()?.num_workers())
    }

    pub fn synchronize() -> Result<(), TensorError> {
        Self::context()?.device.synchronize()?;
        Ok(())
    }
}
