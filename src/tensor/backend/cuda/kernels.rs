//! CUDA C source compiled with NVRTC when the GPU handle is initialized.
//!
//! Every kernel is a template instantiated per element type behind an
//! `extern "C"` entry point named `<kernel>_<suffix>`, with the suffix being
//! `f32`, `f64` or `i32`.

pub const MODULE_NAME: &str = "dtensor";

/// Threads per block. The shared-memory reductions below assume it.
pub const BLOCK: u32 = 256;

pub const KERNEL_SOURCE: &str = r#"
#define BLOCK 256
#define GRID_STRIDE(i, n) \
    for (size_t i = (size_t)blockIdx.x * blockDim.x + threadIdx.x; i < (n); i += (size_t)blockDim.x * gridDim.x)

template <typename T>
__device__ void fill(T* dst, unsigned int n, T value) {
    GRID_STRIDE(i, n) { dst[i] = value; }
}

// cuRAND yields (0, 1]; map onto [lo, hi).
template <typename T>
__device__ void uniform_map(T* dst, unsigned int n, T lo, T hi) {
    GRID_STRIDE(i, n) {
        T x = lo + (hi - lo) * ((T)1 - dst[i]);
        dst[i] = x < hi ? x : lo;
    }
}

// op: 0 square, 1 sqrt, 2 inverse
template <typename T>
__device__ void unary(T* dst, unsigned int n, unsigned int op) {
    GRID_STRIDE(i, n) {
        T x = dst[i];
        if (op == 0) {
            dst[i] = x * x;
        } else if (op == 1) {
            dst[i] = sqrt(x);
        } else {
            dst[i] = (T)1 / x;
        }
    }
}

// mode: 0 elementwise, 1 column vector, 2 row vector
__device__ __forceinline__ size_t source_index(size_t i, unsigned int cols, unsigned int mode) {
    if (mode == 1) return i / cols;
    if (mode == 2) return i % cols;
    return i;
}

template <typename T>
__device__ void axpy(T* dst, unsigned int n, unsigned int cols, T alpha, const T* src, unsigned int mode) {
    GRID_STRIDE(i, n) { dst[i] += alpha * src[source_index(i, cols, mode)]; }
}

template <typename T>
__device__ void elewise_mul(T* dst, unsigned int n, unsigned int cols, const T* src, unsigned int mode) {
    GRID_STRIDE(i, n) { dst[i] *= src[source_index(i, cols, mode)]; }
}

// mode: 0 sum, 1 sum of absolute values, 2 sum of squares.
// One partial result per block, finished on the host.
template <typename T>
__device__ void reduce_partial(const T* src, unsigned int n, unsigned int mode, T* partial) {
    __shared__ T cache[BLOCK];
    T acc = 0;
    GRID_STRIDE(i, n) {
        T x = src[i];
        if (mode == 1) {
            acc += x < (T)0 ? -x : x;
        } else if (mode == 2) {
            acc += x * x;
        } else {
            acc += x;
        }
    }
    cache[threadIdx.x] = acc;
    __syncthreads();
    for (unsigned int s = blockDim.x / 2; s > 0; s >>= 1) {
        if (threadIdx.x < s) cache[threadIdx.x] += cache[threadIdx.x + s];
        __syncthreads();
    }
    if (threadIdx.x == 0) partial[blockIdx.x] = cache[0];
}

template <typename T>
__device__ void mean_rows(const T* src, unsigned int rows, unsigned int cols, T* dst) {
    GRID_STRIDE(r, rows) {
        const T* row = src + (size_t)r * cols;
        T acc = 0;
        for (unsigned int c = 0; c < cols; ++c) acc += row[c];
        dst[r] = acc / (T)cols;
    }
}

template <typename T>
__device__ void mean_cols(const T* src, unsigned int rows, unsigned int cols, T* dst) {
    GRID_STRIDE(c, cols) {
        T acc = 0;
        for (unsigned int r = 0; r < rows; ++r) acc += src[(size_t)r * cols + c];
        dst[c] = acc / (T)rows;
    }
}

// One block per row.
template <typename T>
__device__ void softmax_rows(T* data, unsigned int rows, unsigned int cols) {
    __shared__ T cache[BLOCK];
    for (unsigned int r = blockIdx.x; r < rows; r += gridDim.x) {
        T* row = data + (size_t)r * cols;

        T m = row[0];
        for (unsigned int j = threadIdx.x; j < cols; j += blockDim.x) m = row[j] > m ? row[j] : m;
        cache[threadIdx.x] = m;
        __syncthreads();
        for (unsigned int s = blockDim.x / 2; s > 0; s >>= 1) {
            if (threadIdx.x < s && cache[threadIdx.x + s] > cache[threadIdx.x]) {
                cache[threadIdx.x] = cache[threadIdx.x + s];
            }
            __syncthreads();
        }
        T row_max = cache[0];
        __syncthreads();

        T acc = 0;
        for (unsigned int j = threadIdx.x; j < cols; j += blockDim.x) {
            T e = exp(row[j] - row_max);
            row[j] = e;
            acc += e;
        }
        cache[threadIdx.x] = acc;
        __syncthreads();
        for (unsigned int s = blockDim.x / 2; s > 0; s >>= 1) {
            if (threadIdx.x < s) cache[threadIdx.x] += cache[threadIdx.x + s];
            __syncthreads();
        }
        T total = cache[0];
        __syncthreads();

        for (unsigned int j = threadIdx.x; j < cols; j += blockDim.x) row[j] /= total;
        __syncthreads();
    }
}

// One block per row. Ties resolve to the smaller column index. A NaN
// anywhere raises nan_flag and leaves the result undefined.
template <typename T>
__device__ void argmax_rows(const T* src, unsigned int rows, unsigned int cols, int* dst, int* nan_flag) {
    __shared__ T values[BLOCK];
    __shared__ int indices[BLOCK];
    for (unsigned int r = blockIdx.x; r < rows; r += gridDim.x) {
        const T* row = src + (size_t)r * cols;
        T best = 0;
        int best_idx = -1;
        for (unsigned int j = threadIdx.x; j < cols; j += blockDim.x) {
            T x = row[j];
            if (x != x) {
                *nan_flag = 1;
                continue;
            }
            if (best_idx < 0 || x > best) {
                best = x;
                best_idx = (int)j;
            }
        }
        values[threadIdx.x] = best;
        indices[threadIdx.x] = best_idx;
        __syncthreads();
        for (unsigned int s = blockDim.x / 2; s > 0; s >>= 1) {
            if (threadIdx.x < s) {
                T v = values[threadIdx.x + s];
                int idx = indices[threadIdx.x + s];
                int cur = indices[threadIdx.x];
                if (idx >= 0 && (cur < 0 || v > values[threadIdx.x] || (v == values[threadIdx.x] && idx < cur))) {
                    values[threadIdx.x] = v;
                    indices[threadIdx.x] = idx;
                }
            }
            __syncthreads();
        }
        if (threadIdx.x == 0) dst[r] = indices[0] < 0 ? 0 : indices[0];
        __syncthreads();
    }
}

#define STORAGE_KERNELS(T, S) \
    extern "C" __global__ void fill_##S(T* dst, unsigned int n, T value) { fill<T>(dst, n, value); }

#define FLOAT_KERNELS(T, S) \
    extern "C" __global__ void uniform_map_##S(T* dst, unsigned int n, T lo, T hi) { uniform_map<T>(dst, n, lo, hi); } \
    extern "C" __global__ void unary_##S(T* dst, unsigned int n, unsigned int op) { unary<T>(dst, n, op); } \
    extern "C" __global__ void axpy_##S(T* dst, unsigned int n, unsigned int cols, T alpha, const T* src, unsigned int mode) { axpy<T>(dst, n, cols, alpha, src, mode); } \
    extern "C" __global__ void elewise_mul_##S(T* dst, unsigned int n, unsigned int cols, const T* src, unsigned int mode) { elewise_mul<T>(dst, n, cols, src, mode); } \
    extern "C" __global__ void reduce_partial_##S(const T* src, unsigned int n, unsigned int mode, T* partial) { reduce_partial<T>(src, n, mode, partial); } \
    extern "C" __global__ void mean_rows_##S(const T* src, unsigned int rows, unsigned int cols, T* dst) { mean_rows<T>(src, rows, cols, dst); } \
    extern "C" __global__ void mean_cols_##S(const T* src, unsigned int rows, unsigned int cols, T* dst) { mean_cols<T>(src, rows, cols, dst); } \
    extern "C" __global__ void softmax_rows_##S(T* data, unsigned int rows, unsigned int cols) { softmax_rows<T>(data, rows, cols); } \
    extern "C" __global__ void argmax_rows_##S(const T* src, unsigned int rows, unsigned int cols, int* dst, int* nan_flag) { argmax_rows<T>(src, rows, cols, dst, nan_flag); }

STORAGE_KERNELS(float, f32)
STORAGE_KERNELS(double, f64)
STORAGE_KERNELS(int, i32)
FLOAT_KERNELS(float, f32)
FLOAT_KERNELS(double, f64)
"#;

pub const KERNEL_NAMES: &[&str] = &[
    "fill_f32",
    "fill_f64",
    "fill_i32",
    "uniform_map_f32",
    "uniform_map_f64",
    "unary_f32",
    "unary_f64",
    "axpy_f32",
    "axpy_f64",
    "elewise_mul_f32",
    "elewise_mul_f64",
    "reduce_partial_f32",
    "reduce_partial_f64",
    "mean_rows_f32",
    "mean_rows_f64",
    "mean_cols_f32",
    "mean_cols_f64",
    "softmax_rows_f32",
    "softmax_rows_f64",
    "argmax_rows_f32",
    "argmax_rows_f64",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kernel_name_is_instantiated() {
        for name in KERNEL_NAMES {
            let (kernel, suffix): (&str, &str) = name.rsplit_once('_').unwrap();
            assert!(KERNEL_SOURCE.contains(&format!("void {kernel}_##S(")));
            assert!(["f32", "f64", "i32"].contains(&suffix));
        }
    }
}
