// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Ground truth for library members whose source is not part of a snapshot.
//!
//! The database is built once per process from the tables below (optionally extended from
//! configuration) and is read-only afterwards. Construction fails if a signature is classified
//! both ways, since a single ambiguous entry would silently flip every verdict depending on it.

use log::debug;
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::declaring_type_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KnownPurity {
    Pure,
    Impure,
    Unknown,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KnownMemberError {
    #[error("known-member database is inconsistent: `{0}` is listed as both pure and impure")]
    Conflict(String),
    #[error(
        "known-member database is inconsistent: `{member}` is listed as impure but all members \
         of `{type_name}` are listed as pure"
    )]
    TypeConflict { member: String, type_name: String },
}

#[derive(Debug, Clone)]
pub struct KnownMemberDatabase {
    pure_types: BTreeSet<String>,
    pure: BTreeSet<String>,
    impure: BTreeSet<String>,
}

static BUILTIN: OnceCell<KnownMemberDatabase> = OnceCell::new();

impl KnownMemberDatabase {
    pub fn new<S: AsRef<str>>(
        pure_types: &[S],
        pure: &[S],
        impure: &[S],
    ) -> Result<Self, KnownMemberError> {
        let collect = |items: &[S]| -> BTreeSet<String> {
            items.iter().map(|s| s.as_ref().to_string()).collect()
        };
        let db = Self {
            pure_types: collect(pure_types),
            pure: collect(pure),
            impure: collect(impure),
        };
        db.check_integrity()?;
        Ok(db)
    }

    /// The process-wide database built from the built-in tables.
    pub fn builtin() -> Result<&'static KnownMemberDatabase, KnownMemberError> {
        BUILTIN.get_or_try_init(|| {
            let db = Self::new(PURE_TYPES, PURE_MEMBERS, IMPURE_MEMBERS)?;
            debug!(
                "known-member database initialized: {} pure types, {} pure members, {} impure members",
                db.pure_types.len(),
                db.pure.len(),
                db.impure.len()
            );
            Ok(db)
        })
    }

    /// The built-in tables extended with additional entries. The integrity check covers the
    /// merged tables.
    pub fn with_extensions<S: AsRef<str>>(
        pure: &[S],
        impure: &[S],
    ) -> Result<Self, KnownMemberError> {
        let builtin = Self::builtin()?;
        let mut db = builtin.clone();
        db.pure.extend(pure.iter().map(|s| s.as_ref().to_string()));
        db.impure.extend(impure.iter().map(|s| s.as_ref().to_string()));
        db.check_integrity()?;
        Ok(db)
    }

    fn check_integrity(&self) -> Result<(), KnownMemberError> {
        if let Some(signature) = self.pure.intersection(&self.impure).next() {
            return Err(KnownMemberError::Conflict(signature.clone()));
        }
        for member in &self.impure {
            let type_name = declaring_type_of(member);
            if self.pure_types.contains(type_name) {
                return Err(KnownMemberError::TypeConflict {
                    member: member.clone(),
                    type_name: type_name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn classify(&self, signature: &str) -> KnownPurity {
        if self.impure.contains(signature) {
            KnownPurity::Impure
        } else if self.pure.contains(signature)
            || self.pure_types.contains(declaring_type_of(signature))
        {
            KnownPurity::Pure
        } else {
            KnownPurity::Unknown
        }
    }

    pub fn len(&self) -> usize {
        self.pure.len() + self.impure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.pure_types.is_empty()
    }
}

// Types all of whose members are pure.
const PURE_TYPES: &[&str] = &[
    "System.Math",
    "System.MathF",
    "System.Index",
    "System.Range",
    "System.Tuple",
    "System.ValueTuple",
    "System.Numerics.BigInteger",
    "System.Numerics.Vector2",
    "System.Numerics.Vector3",
];

const PURE_MEMBERS: &[&str] = &[
    // Object
    "System.Object..ctor()",
    "System.Object.GetType()",
    "System.Object.ReferenceEquals(object,object)",
    "System.Object.Equals(object,object)",
    // String
    "System.String.get_Length()",
    "System.String.get_Chars(int)",
    "System.String.Concat(string,string)",
    "System.String.Concat(string,string,string)",
    "System.String.Concat(object,object)",
    "System.String.Substring(int)",
    "System.String.Substring(int,int)",
    "System.String.Contains(string)",
    "System.String.Contains(char)",
    "System.String.StartsWith(string,System.StringComparison)",
    "System.String.EndsWith(string,System.StringComparison)",
    "System.String.IndexOf(char)",
    "System.String.IndexOf(string,System.StringComparison)",
    "System.String.Equals(string)",
    "System.String.Equals(string,string)",
    "System.String.CompareOrdinal(string,string)",
    "System.String.IsNullOrEmpty(string)",
    "System.String.IsNullOrWhiteSpace(string)",
    "System.String.Trim()",
    "System.String.ToUpperInvariant()",
    "System.String.ToLowerInvariant()",
    "System.String.Replace(string,string)",
    "System.String.Split(char)",
    "System.String.ToString()",
    "System.String.GetHashCode()",
    // Primitive types
    "System.Int32.CompareTo(int)",
    "System.Int32.Equals(int)",
    "System.Int32.GetHashCode()",
    "System.Int32.Parse(string,System.IFormatProvider)",
    "System.Int32.ToString(System.IFormatProvider)",
    "System.Int64.CompareTo(long)",
    "System.Int64.Equals(long)",
    "System.Double.IsNaN(double)",
    "System.Double.IsInfinity(double)",
    "System.Boolean.Equals(bool)",
    "System.Char.IsDigit(char)",
    "System.Char.IsLetter(char)",
    "System.Char.IsWhiteSpace(char)",
    "System.Char.ToUpperInvariant(char)",
    "System.Char.ToLowerInvariant(char)",
    // Nullable
    "System.Nullable`1.get_HasValue()",
    "System.Nullable`1.get_Value()",
    "System.Nullable`1.GetValueOrDefault()",
    // Arrays and spans
    "System.Array.get_Length()",
    "System.Array.Empty`1()",
    "System.Array.IndexOf`1(T[],T)",
    "System.ReadOnlySpan`1.get_Length()",
    "System.ReadOnlySpan`1.get_Item(int)",
    "System.ReadOnlySpan`1.Slice(int,int)",
    "System.MemoryExtensions.AsSpan`1(T[])",
    // Collections (read-only members and construction)
    "System.Collections.Generic.List`1..ctor()",
    "System.Collections.Generic.List`1..ctor(int)",
    "System.Collections.Generic.List`1.get_Count()",
    "System.Collections.Generic.List`1.get_Item(int)",
    "System.Collections.Generic.List`1.Contains(T)",
    "System.Collections.Generic.Dictionary`2..ctor()",
    "System.Collections.Generic.Dictionary`2.get_Count()",
    "System.Collections.Generic.Dictionary`2.get_Item(TKey)",
    "System.Collections.Generic.Dictionary`2.ContainsKey(TKey)",
    "System.Collections.Generic.Dictionary`2.TryGetValue(TKey,out TValue)",
    "System.Collections.Generic.HashSet`1..ctor()",
    "System.Collections.Generic.HashSet`1.Contains(T)",
    "System.Collections.Immutable.ImmutableArray`1.get_Length()",
    "System.Collections.Immutable.ImmutableArray`1.get_Item(int)",
    "System.Collections.Immutable.ImmutableArray`1.Add(T)",
    "System.Collections.Immutable.ImmutableList`1.Add(T)",
    // Linq (without delegate arguments)
    "System.Linq.Enumerable.Count`1(System.Collections.Generic.IEnumerable<T>)",
    "System.Linq.Enumerable.Any`1(System.Collections.Generic.IEnumerable<T>)",
    "System.Linq.Enumerable.First`1(System.Collections.Generic.IEnumerable<T>)",
    "System.Linq.Enumerable.Sum(System.Collections.Generic.IEnumerable<int>)",
    "System.Linq.Enumerable.ToArray`1(System.Collections.Generic.IEnumerable<T>)",
    "System.Linq.Enumerable.ToList`1(System.Collections.Generic.IEnumerable<T>)",
    // Tasks
    "System.Threading.Tasks.Task.FromResult`1(TResult)",
    "System.Threading.Tasks.Task.get_CompletedTask()",
    "System.Threading.Tasks.Task`1.get_Result()",
    // Exceptions
    "System.Exception..ctor(string)",
    "System.ArgumentException..ctor(string)",
    "System.ArgumentNullException..ctor(string)",
    "System.ArgumentOutOfRangeException..ctor(string)",
    "System.InvalidOperationException..ctor(string)",
];

const IMPURE_MEMBERS: &[&str] = &[
    // Console and I/O
    "System.Console.WriteLine(string)",
    "System.Console.WriteLine(object)",
    "System.Console.Write(string)",
    "System.Console.ReadLine()",
    "System.IO.File.ReadAllText(string)",
    "System.IO.File.WriteAllText(string,string)",
    "System.IO.File.Exists(string)",
    "System.IO.File.Delete(string)",
    "System.IO.Directory.CreateDirectory(string)",
    "System.IO.Stream.Read(byte[],int,int)",
    "System.IO.Stream.Write(byte[],int,int)",
    "System.Diagnostics.Debug.WriteLine(string)",
    "System.Diagnostics.Trace.WriteLine(string)",
    // Clocks, randomness and environment
    "System.DateTime.get_Now()",
    "System.DateTime.get_UtcNow()",
    "System.DateTime.get_Today()",
    "System.DateTimeOffset.get_Now()",
    "System.DateTimeOffset.get_UtcNow()",
    "System.Diagnostics.Stopwatch.GetTimestamp()",
    "System.Diagnostics.Stopwatch.StartNew()",
    "System.Environment.get_TickCount()",
    "System.Environment.get_TickCount64()",
    "System.Environment.GetEnvironmentVariable(string)",
    "System.Environment.Exit(int)",
    "System.Random..ctor()",
    "System.Random.Next()",
    "System.Random.Next(int)",
    "System.Random.Next(int,int)",
    "System.Random.NextDouble()",
    "System.Random.get_Shared()",
    "System.Guid.NewGuid()",
    "System.GC.Collect()",
    // Threading
    "System.Threading.Thread.Sleep(int)",
    "System.Threading.Thread.get_CurrentThread()",
    "System.Threading.Interlocked.Increment(ref int)",
    "System.Threading.Interlocked.Decrement(ref int)",
    "System.Threading.Interlocked.Exchange(ref int,int)",
    "System.Threading.Interlocked.CompareExchange(ref int,int,int)",
    "System.Threading.Volatile.Read(ref int)",
    "System.Threading.Volatile.Write(ref int,int)",
    "System.Threading.Monitor.Enter(object)",
    "System.Threading.Monitor.Enter(object,ref bool)",
    "System.Threading.Monitor.TryEnter(object)",
    "System.Threading.Monitor.Exit(object)",
    "System.Threading.Lock.Enter()",
    "System.Threading.Lock.Exit()",
    "System.Threading.SpinLock.Enter(ref bool)",
    "System.Threading.SpinLock.Exit()",
    "System.Threading.SemaphoreSlim.Wait()",
    "System.Threading.SemaphoreSlim.WaitAsync()",
    "System.Threading.SemaphoreSlim.Release()",
    "System.Threading.Mutex.WaitOne()",
    "System.Threading.Mutex.ReleaseMutex()",
    "System.Threading.ReaderWriterLockSlim.EnterReadLock()",
    "System.Threading.ReaderWriterLockSlim.ExitReadLock()",
    "System.Threading.ReaderWriterLockSlim.EnterWriteLock()",
    "System.Threading.ReaderWriterLockSlim.ExitWriteLock()",
    "System.Threading.Tasks.Task.Delay(int)",
    "System.Threading.Tasks.Task.Run(System.Action)",
    // Collection mutation
    "System.Collections.Generic.List`1.Add(T)",
    "System.Collections.Generic.List`1.Remove(T)",
    "System.Collections.Generic.List`1.Clear()",
    "System.Collections.Generic.List`1.set_Item(int,T)",
    "System.Collections.Generic.List`1.Sort()",
    "System.Collections.Generic.Dictionary`2.Add(TKey,TValue)",
    "System.Collections.Generic.Dictionary`2.set_Item(TKey,TValue)",
    "System.Collections.Generic.Dictionary`2.Remove(TKey)",
    "System.Collections.Generic.HashSet`1.Add(T)",
    "System.Collections.Generic.Queue`1.Enqueue(T)",
    "System.Collections.Generic.Queue`1.Dequeue()",
    "System.Collections.Generic.Stack`1.Push(T)",
    "System.Collections.Generic.Stack`1.Pop()",
    "System.Array.Sort`1(T[])",
    "System.Array.Clear(System.Array)",
    "System.Array.Resize`1(ref T[],int)",
    "System.Text.StringBuilder.Append(string)",
    "System.Text.StringBuilder.Clear()",
];
