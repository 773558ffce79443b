//! スレッドのプロセッサ割り当て
//!
//! 置換表のクリアをスレッドごとに異なるプロセッサで行うと、first-touch
//! ポリシーの NUMA 環境で各ノードにメモリが分散して配置される。
//! バインドはあくまでヒントであり、失敗しても動作には影響しない。

use log::debug;

/// スレッドを index に対応するプロセッサへバインドするトレイト
pub trait ThreadBinder: Sync {
    /// 呼び出したスレッド自身をバインドする
    fn bind_this_thread(&self, index: usize);
}

/// OS のアフィニティ API を使う実装
///
/// Linux はプロセスに許可された CPU、Windows は論理プロセッサ番号を
/// index で巡回して割り当てる。それ以外の OS では何もしない。
#[derive(Clone, Copy, Debug, Default)]
pub struct OsThreadBinder;

impl ThreadBinder for OsThreadBinder {
    fn bind_this_thread(&self, index: usize) {
        if !os::bind(index) {
            debug!("thread {index}: affinity binding is not available");
        }
    }
}

/// バインドを行わないダミー実装
///
/// テストや、OS のスケジューラに任せたい場合に使用する。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBinding;

impl ThreadBinder for NoBinding {
    #[inline]
    fn bind_this_thread(&self, _index: usize) {}
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod os {
    use std::mem::{size_of, zeroed};

    pub(super) fn bind(index: usize) -> bool {
        unsafe {
            let mut allowed: libc::cpu_set_t = zeroed();
            if libc::sched_getaffinity(0, size_of::<libc::cpu_set_t>(), &mut allowed) != 0 {
                return false;
            }

            let cpus: Vec<usize> = (0..libc::CPU_SETSIZE as usize)
                .filter(|&cpu| libc::CPU_ISSET(cpu, &allowed))
                .collect();
            if cpus.is_empty() {
                return false;
            }

            let mut set: libc::cpu_set_t = zeroed();
            libc::CPU_SET(cpus[index % cpus.len()], &mut set);
            libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set) == 0
        }
    }
}

#[cfg(windows)]
mod os {
    use windows_sys::Win32::System::Threading::{GetCurrentThread, SetThreadAffinityMask};

    pub(super) fn bind(index: usize) -> bool {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(usize::BITS as usize);
        let mask = 1usize << (index % cpus);
        unsafe { SetThreadAffinityMask(GetCurrentThread(), mask) != 0 }
    }
}

#[cfg(not(any(windows, target_os = "linux", target_os = "android")))]
mod os {
    pub(super) fn bind(_index: usize) -> bool {
        false
    }
}
