//! 置換表メモリの確保と解放
//!
//! Large Pages が有効かつ権限がある場合は OS の大きなページで確保し、
//! 失敗したら通常のヒープ確保に切り替える。解放は確保した方法に合わせる。

use super::CACHE_LINE_SIZE;
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

/// 通常確保のアラインメント（キャッシュライン境界への調整は余裕分で行う）
const REGULAR_ALIGN: usize = std::mem::align_of::<usize>();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AllocKind {
    LargePages,
    Regular,
}

/// 置換表が所有する生メモリ
pub(super) struct Allocation {
    base: NonNull<u8>,
    /// OS / アロケータに要求した実サイズ
    len: usize,
    kind: AllocKind,
}

impl Allocation {
    /// `size` バイトをキャッシュライン境界から使える領域を確保する
    ///
    /// `large_pages` が真なら Large Pages を試し、失敗時は通常確保に切り替える。
    /// 通常確保にも失敗した場合はプロセスを終了する。
    pub(super) fn allocate(size: usize, large_pages: bool) -> Self {
        if large_pages {
            match try_large_pages(size) {
                Some(alloc) => {
                    info!("Hash LargePages {} MiB", alloc.len >> 20);
                    return alloc;
                }
                None => warn!(
                    "Failed to allocate {} MiB Large Page Memory for transposition table, switching to default",
                    size >> 20
                ),
            }
        }
        alloc_regular(size)
    }

    /// キャッシュライン境界に揃えた先頭アドレス
    pub(super) fn table_ptr(&self) -> NonNull<u8> {
        let addr = self.base.as_ptr() as usize;
        let offset = align_up(addr, CACHE_LINE_SIZE) - addr;
        // SAFETY: 通常確保は CACHE_LINE_SIZE - 1 バイトの余裕を持ち、
        // Large Pages はページ境界なので offset == 0
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    pub(super) fn kind(&self) -> AllocKind {
        self.kind
    }
}

#[cfg(test)]
thread_local! {
    static FAIL_LARGE_PAGES: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// このスレッドでの Large Pages 確保を強制的に失敗させる（テスト用）
#[cfg(test)]
pub(super) fn fail_large_pages_on_this_thread(fail: bool) {
    FAIL_LARGE_PAGES.with(|f| f.set(fail));
}

fn try_large_pages(size: usize) -> Option<Allocation> {
    #[cfg(test)]
    if FAIL_LARGE_PAGES.with(|f| f.get()) {
        return None;
    }
    os::alloc_large_pages(size)
}

fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    debug_assert!(
        value.checked_add(align - 1).is_some(),
        "align_up overflow: value={value}, align={align}"
    );
    (value + align - 1) & !(align - 1)
}

fn alloc_regular(size: usize) -> Allocation {
    let len = size.saturating_add(CACHE_LINE_SIZE - 1);
    let Ok(layout) = Layout::from_size_align(len, REGULAR_ALIGN) else {
        error!("Failed to allocate {} MiB for transposition table.", size >> 20);
        std::process::exit(1);
    };

    // SAFETY: len > 0（CACHE_LINE_SIZE - 1 を加えている）
    let ptr = unsafe { alloc(layout) };
    let Some(base) = NonNull::new(ptr) else {
        error!("Failed to allocate {} MiB for transposition table.", size >> 20);
        std::alloc::handle_alloc_error(layout);
    };

    Allocation {
        base,
        len,
        kind: AllocKind::Regular,
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        match self.kind {
            AllocKind::LargePages => unsafe { os::free_large_pages(self.base, self.len) },
            AllocKind::Regular => unsafe {
                let layout = Layout::from_size_align_unchecked(self.len, REGULAR_ALIGN);
                dealloc(self.base.as_ptr(), layout);
            },
        }
    }
}

// SAFETY: Allocation owns raw memory for the TT and is protected by higher-level synchronization.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

static LARGE_PAGE_PRIVILEGE: OnceCell<bool> = OnceCell::new();

/// Large Pages を使う権限があるか（プロセス内で一度だけ問い合わせる）
pub(super) fn large_page_privilege() -> bool {
    *LARGE_PAGE_PRIVILEGE.get_or_init(|| {
        let granted = os::acquire_large_page_privilege();
        if !granted {
            warn!("No Privilege for Large Pages");
        }
        granted
    })
}

#[cfg(windows)]
mod os {
    use super::{AllocKind, Allocation, align_up};
    use log::warn;
    use std::ptr::NonNull;
    use windows_sys::Win32::Foundation::{
        CloseHandle, ERROR_NOT_ALL_ASSIGNED, GetLastError, HANDLE, LUID,
    };
    use windows_sys::Win32::Security::{
        AdjustTokenPrivileges, LUID_AND_ATTRIBUTES, LookupPrivilegeValueA, SE_PRIVILEGE_ENABLED,
        TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Memory::{
        GetLargePageMinimum, MEM_COMMIT, MEM_LARGE_PAGES, MEM_RELEASE, MEM_RESERVE,
        PAGE_READWRITE, VirtualAlloc, VirtualFree,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    /// SeLockMemoryPrivilege を有効化する
    pub(super) fn acquire_large_page_privilege() -> bool {
        unsafe {
            let mut token: HANDLE = std::ptr::null_mut();
            if OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            ) == 0
            {
                return false;
            }

            let mut luid = LUID {
                LowPart: 0,
                HighPart: 0,
            };
            if LookupPrivilegeValueA(
                std::ptr::null(),
                b"SeLockMemoryPrivilege\0".as_ptr(),
                &mut luid,
            ) == 0
            {
                CloseHandle(token);
                return false;
            }

            let tp = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: luid,
                    Attributes: SE_PRIVILEGE_ENABLED,
                }],
            };

            // AdjustTokenPrivileges が非ゼロを返しても ERROR_NOT_ALL_ASSIGNED なら
            // 権限は付与されていない
            let ok = AdjustTokenPrivileges(
                token,
                0,
                &tp,
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            ) != 0
                && GetLastError() != ERROR_NOT_ALL_ASSIGNED;
            CloseHandle(token);
            ok
        }
    }

    pub(super) fn alloc_large_pages(size: usize) -> Option<Allocation> {
        unsafe {
            let large_page_size = GetLargePageMinimum();
            if large_page_size == 0 {
                return None;
            }

            let len = align_up(size, large_page_size);
            let ptr = VirtualAlloc(
                std::ptr::null(),
                len,
                MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
                PAGE_READWRITE,
            );
            let base = NonNull::new(ptr as *mut u8)?;
            Some(Allocation {
                base,
                len,
                kind: AllocKind::LargePages,
            })
        }
    }

    pub(super) unsafe fn free_large_pages(base: NonNull<u8>, _len: usize) {
        let ok = unsafe { VirtualFree(base.as_ptr() as *mut _, 0, MEM_RELEASE) };
        if ok == 0 {
            // リソースリークの可能性があるため、リリースビルドでも警告を出力
            warn!("VirtualFree failed with error {}", unsafe { GetLastError() });
            debug_assert!(false, "VirtualFree failed");
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod os {
    use super::{AllocKind, Allocation, align_up};
    use log::{debug, warn};
    use std::ptr::NonNull;

    /// x86_64 / aarch64 の標準的な huge page サイズ
    const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

    /// Linux では huge page の利用に特別な権限は要らない
    pub(super) fn acquire_large_page_privilege() -> bool {
        true
    }

    /// hugetlbfs のページを優先し、予約がなければ THP を要求する
    pub(super) fn alloc_large_pages(size: usize) -> Option<Allocation> {
        let len = align_up(size, HUGE_PAGE_SIZE);
        let prot = libc::PROT_READ | libc::PROT_WRITE;
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

        unsafe {
            let ptr = libc::mmap(std::ptr::null_mut(), len, prot, flags | libc::MAP_HUGETLB, -1, 0);
            if ptr != libc::MAP_FAILED {
                return large_pages(ptr, len);
            }
            debug!("MAP_HUGETLB failed, trying transparent huge pages");

            let ptr = libc::mmap(std::ptr::null_mut(), len, prot, flags, -1, 0);
            if ptr == libc::MAP_FAILED {
                return None;
            }
            if libc::madvise(ptr, len, libc::MADV_HUGEPAGE) != 0 {
                libc::munmap(ptr, len);
                return None;
            }
            large_pages(ptr, len)
        }
    }

    fn large_pages(ptr: *mut libc::c_void, len: usize) -> Option<Allocation> {
        NonNull::new(ptr as *mut u8).map(|base| Allocation {
            base,
            len,
            kind: AllocKind::LargePages,
        })
    }

    pub(super) unsafe fn free_large_pages(base: NonNull<u8>, len: usize) {
        if unsafe { libc::munmap(base.as_ptr() as *mut _, len) } != 0 {
            warn!("munmap failed for {} bytes", len);
            debug_assert!(false, "munmap failed");
        }
    }
}

#[cfg(not(any(windows, target_os = "linux", target_os = "android")))]
mod os {
    use super::Allocation;
    use std::ptr::NonNull;

    pub(super) fn acquire_large_page_privilege() -> bool {
        false
    }

    pub(super) fn alloc_large_pages(_size: usize) -> Option<Allocation> {
        None
    }

    pub(super) unsafe fn free_large_pages(_base: NonNull<u8>, _len: usize) {
        unreachable!("large pages are never allocated on this platform");
    }
}
